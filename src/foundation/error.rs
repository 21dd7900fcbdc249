/// Convenience result type used across djv.
pub type DjvResult<T> = Result<T, DjvError>;

/// Top-level error taxonomy used by the I/O, cache and playback APIs.
#[derive(thiserror::Error, Debug)]
pub enum DjvError {
    /// No registered plugin claims the file.
    #[error("unrecognized file: '{file}'")]
    Unrecognized {
        /// File that could not be matched.
        file: String,
    },

    /// The plugin recognizes the file but cannot represent its layout/encoding.
    #[error("unsupported [{plugin}] '{file}': {reason}")]
    Unsupported {
        /// Static plugin name.
        plugin: &'static str,
        /// File being opened or written.
        file: String,
        /// What is unsupported.
        reason: String,
    },

    /// The file could not be opened or its header is invalid.
    #[error("cannot open [{plugin}] '{file}': {reason}")]
    Open {
        /// Static plugin name.
        plugin: &'static str,
        /// File being opened.
        file: String,
        /// Why opening failed.
        reason: String,
    },

    /// A scanline or frame could not be decoded.
    #[error("cannot read [{plugin}] '{file}': {reason}")]
    Read {
        /// Static plugin name.
        plugin: &'static str,
        /// File being read.
        file: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Encoding or flushing failed.
    #[error("cannot write [{plugin}] '{file}': {reason}")]
    Write {
        /// Static plugin name.
        plugin: &'static str,
        /// File being written.
        file: String,
        /// Why writing failed.
        reason: String,
    },

    /// A plugin option value or command-line token could not be parsed.
    #[error("option error [{plugin}]: cannot parse '{token}'")]
    Option {
        /// Static plugin name.
        plugin: &'static str,
        /// Offending token.
        token: String,
    },

    /// Invalid caller-supplied data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DjvError {
    /// Build a [`DjvError::Unrecognized`] value.
    pub fn unrecognized(file: impl Into<String>) -> Self {
        Self::Unrecognized { file: file.into() }
    }

    /// Build a [`DjvError::Unsupported`] value.
    pub fn unsupported(
        plugin: &'static str,
        file: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Unsupported {
            plugin,
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`DjvError::Open`] value.
    pub fn open(plugin: &'static str, file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Open {
            plugin,
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`DjvError::Read`] value.
    pub fn read(plugin: &'static str, file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            plugin,
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`DjvError::Write`] value.
    pub fn write(plugin: &'static str, file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            plugin,
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`DjvError::Option`] value.
    pub fn option(plugin: &'static str, token: impl Into<String>) -> Self {
        Self::Option {
            plugin,
            token: token.into(),
        }
    }

    /// Build a [`DjvError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
