/// Logger handle injected into components that emit log events.
///
/// A handle either carries its own [`tracing::Dispatch`] or, when built with
/// [`Logger::default`], forwards to whatever subscriber is the process default at the time of the
/// event. Components never reach for a global logging object; they log through the handle they
/// were constructed with.
#[derive(Clone, Default)]
pub struct Logger {
    dispatch: Option<tracing::Dispatch>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("injected", &self.dispatch.is_some())
            .finish()
    }
}

impl Logger {
    /// Logger routing every event to `dispatch`.
    pub fn new(dispatch: tracing::Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Logger bound to the dispatcher that is current on the calling thread.
    ///
    /// Useful when handing a logger to a worker thread, which would otherwise only see the global
    /// default.
    pub fn current() -> Self {
        Self {
            dispatch: Some(tracing::dispatcher::get_default(|d| d.clone())),
        }
    }

    /// Logger that discards everything.
    pub fn silent() -> Self {
        Self {
            dispatch: Some(tracing::Dispatch::none()),
        }
    }

    /// Run `f` with this logger's dispatcher active.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(d) => tracing::dispatcher::with_default(d, f),
            None => f(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/log.rs"]
mod tests;
