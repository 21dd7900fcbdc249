//! File names, numbered frame sequences and directory listing.
//!
//! A file name splits into `base`, `number` and `extension`: `render.0012.exr` becomes
//! `render.`, `0012` and `.exr`. Files that share a base and extension aggregate into a
//! [`Sequence`], which maps frame numbers back to file names.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::core::Speed;
use crate::foundation::error::{DjvError, DjvResult};

/// What a [`FileInfo`] refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub enum FileKind {
    /// A single file.
    #[default]
    File,
    /// A numbered range of same-named files.
    Sequence,
    /// A directory.
    Directory,
}

/// Ordered list of frame numbers plus zero-padding width.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sequence {
    /// Frame numbers, in playback order.
    pub frames: Vec<i64>,
    /// Zero-padding width; `0` means unpadded.
    pub pad: usize,
    /// Playback speed.
    pub speed: Speed,
}

impl Sequence {
    /// Sequence holding `frames` with padding `pad` at the default speed.
    pub fn new(frames: Vec<i64>, pad: usize) -> Self {
        Self {
            frames,
            pad,
            speed: Speed::default(),
        }
    }

    /// Contiguous sequence `start..=end`.
    pub fn range(start: i64, end: i64, pad: usize) -> Self {
        Self::new((start..=end).collect(), pad)
    }

    /// Longest frame list [`Sequence::parse`] expands.
    pub const MAX_FRAMES: usize = 1_000_000;

    /// Parse a range list such as `1-3,5,0007-0009`.
    ///
    /// Padding is taken from the first element when it carries a leading zero. Lists expanding to
    /// more than [`Sequence::MAX_FRAMES`] frames are rejected.
    pub fn parse(s: &str) -> DjvResult<Self> {
        let mut frames = Vec::new();
        let mut pad = None;
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(DjvError::validation(format!("empty range in '{s}'")));
            }
            let (a, b) = match part.split_once('-') {
                Some((a, b)) => (a, Some(b)),
                None => (part, None),
            };
            let start = parse_frame(a, s)?;
            if pad.is_none() {
                pad = Some(padding_of(a));
            }
            match b {
                Some(b) => {
                    let end = parse_frame(b, s)?;
                    let span = usize::try_from(end.abs_diff(start)).unwrap_or(usize::MAX);
                    if span >= Self::MAX_FRAMES.saturating_sub(frames.len()) {
                        return Err(DjvError::validation(format!(
                            "'{s}' expands to more than {} frames",
                            Self::MAX_FRAMES
                        )));
                    }
                    if end >= start {
                        frames.extend(start..=end);
                    } else {
                        frames.extend((end..=start).rev());
                    }
                }
                None => frames.push(start),
            }
            if frames.len() > Self::MAX_FRAMES {
                return Err(DjvError::validation(format!(
                    "'{s}' expands to more than {} frames",
                    Self::MAX_FRAMES
                )));
            }
        }
        Ok(Self::new(frames, pad.unwrap_or(0)))
    }

    /// First frame, if any.
    pub fn first(&self) -> Option<i64> {
        self.frames.first().copied()
    }

    /// Last frame, if any.
    pub fn last(&self) -> Option<i64> {
        self.frames.last().copied()
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` when the sequence holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sort frames ascending and drop duplicates.
    pub fn sort(&mut self) {
        self.frames.sort_unstable();
        self.frames.dedup();
    }

    /// Format `frame` with this sequence's padding.
    pub fn format_frame(&self, frame: i64) -> String {
        if frame < 0 {
            format!("-{:0width$}", frame.unsigned_abs(), width = self.pad)
        } else {
            format!("{:0width$}", frame, width = self.pad)
        }
    }
}

impl fmt::Display for Sequence {
    /// Compact range list: consecutive runs collapse to `a-b`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut i = 0;
        while i < self.frames.len() {
            let start = self.frames[i];
            let mut end = start;
            while i + 1 < self.frames.len() && self.frames[i + 1] == end + 1 {
                end += 1;
                i += 1;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                f.write_str(&self.format_frame(start))?;
            } else {
                write!(f, "{}-{}", self.format_frame(start), self.format_frame(end))?;
            }
            i += 1;
        }
        Ok(())
    }
}

fn parse_frame(token: &str, whole: &str) -> DjvResult<i64> {
    token
        .trim()
        .parse::<i64>()
        .map_err(|_| DjvError::validation(format!("invalid frame '{token}' in '{whole}'")))
}

fn padding_of(digits: &str) -> usize {
    if digits.len() > 1 && digits.starts_with('0') {
        digits.len()
    } else {
        0
    }
}

/// A file, file sequence or directory on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    dir: PathBuf,
    base: String,
    number: String,
    extension: String,
    kind: FileKind,
    sequence: Sequence,
}

impl FileInfo {
    /// Split the name of an existing file into its components.
    ///
    /// The name is taken literally: a trailing run of digits is the frame number, so
    /// `a.0001.dpx` yields a single-frame sequence and `plate_2019-2021.ppm` is frame `2021` of
    /// base `plate_2019-`. The entry always stays [`FileKind::File`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        let (mut out, stem) = Self::split(path.as_ref());
        let Some((base, number)) = split_digits(&stem) else {
            return out;
        };
        if let Ok(frame) = number.parse::<i64>() {
            out.sequence = Sequence::new(vec![frame], padding_of(number));
            out.number = number.to_string();
            out.base = base.to_string();
        }
        out
    }

    /// Parse a user-supplied name that may describe several frames.
    ///
    /// Range names (`a.1-10.dpx`, `a.1-3,5.dpx`) and hash names (`a.####.dpx`) yield a
    /// [`FileKind::Sequence`]; anything else is read like [`FileInfo::new`].
    pub fn pattern(path: impl AsRef<Path>) -> DjvResult<Self> {
        let (mut out, stem) = Self::split(path.as_ref());

        let hashes = stem.len() - stem.trim_end_matches('#').len();
        if hashes > 0 {
            out.base = stem[..stem.len() - hashes].to_string();
            out.kind = FileKind::Sequence;
            out.sequence = Sequence::new(Vec::new(), if hashes > 1 { hashes } else { 0 });
            return Ok(out);
        }

        match split_range(&stem) {
            Some((base, number)) if number.contains(['-', ',']) => {
                let seq = Sequence::parse(number)?;
                out.base = base.to_string();
                out.number = number.to_string();
                out.set_sequence(seq);
                Ok(out)
            }
            _ => Ok(Self::new(path)),
        }
    }

    /// Directory, name stem and extension of `path`; `base` holds the whole stem.
    fn split(path: &Path) -> (Self, String) {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stem, extension) = split_extension(&name);
        let out = Self {
            dir,
            base: stem.to_string(),
            extension: extension.to_string(),
            ..Self::default()
        };
        (out, stem.to_string())
    }

    /// Directory entry.
    pub fn directory(path: impl AsRef<Path>) -> Self {
        let mut out = Self::new(path.as_ref());
        out.base = path
            .as_ref()
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.number.clear();
        out.extension.clear();
        out.sequence = Sequence::default();
        out.kind = FileKind::Directory;
        out
    }

    /// Parent directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name prefix before the frame number.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Frame number (or range) text as it appeared in the name.
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Extension including the leading dot, as it appeared in the name.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Lower-cased extension used for plugin matching.
    pub fn extension_lower(&self) -> String {
        self.extension.to_ascii_lowercase()
    }

    /// Entry kind.
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Frame sequence (single frame for numbered files, empty for plain files).
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Replace the sequence; more than one frame turns the entry into a
    /// [`FileKind::Sequence`].
    pub fn set_sequence(&mut self, sequence: Sequence) {
        if self.kind != FileKind::Directory {
            self.kind = if sequence.len() > 1 {
                FileKind::Sequence
            } else {
                FileKind::File
            };
        }
        self.sequence = sequence;
    }

    /// `true` when the name carries a frame number.
    pub fn is_numbered(&self) -> bool {
        !self.sequence.frames.is_empty() || self.kind == FileKind::Sequence
    }

    /// Display name: the file name, or `base` + range + extension for sequences.
    pub fn file_name(&self) -> String {
        match self.kind {
            FileKind::Sequence => format!("{}{}{}", self.base, self.sequence, self.extension),
            FileKind::Directory => self.base.clone(),
            FileKind::File => format!("{}{}{}", self.base, self.number, self.extension),
        }
    }

    /// File name holding `frame`.
    ///
    /// Files without a number ignore `frame`.
    pub fn file_name_for(&self, frame: i64) -> String {
        if !self.is_numbered() {
            return self.file_name();
        }
        format!(
            "{}{}{}",
            self.base,
            self.sequence.format_frame(frame),
            self.extension
        )
    }

    /// Full path of the file holding `frame`.
    pub fn path_for(&self, frame: i64) -> PathBuf {
        self.dir.join(self.file_name_for(frame))
    }

    /// Full path of the entry; sequences resolve to their first frame.
    pub fn path(&self) -> PathBuf {
        match (self.kind, self.sequence.first()) {
            (FileKind::Sequence, Some(first)) => self.path_for(first),
            _ => self.dir.join(self.file_name()),
        }
    }

    /// Merge a numbered file with the same base, extension and compatible padding into this
    /// entry. Returns `false` when `other` does not belong to this sequence.
    pub fn add_to_sequence(&mut self, other: &FileInfo) -> bool {
        if self.kind == FileKind::Directory
            || other.kind == FileKind::Directory
            || self.dir != other.dir
            || self.base != other.base
            || self.extension != other.extension
            || !self.is_numbered()
            || other.sequence.frames.is_empty()
        {
            return false;
        }
        if !pad_compatible(&self.sequence, &other.sequence) {
            return false;
        }
        self.sequence.pad = self.sequence.pad.max(other.sequence.pad);
        self.sequence.frames.extend_from_slice(&other.sequence.frames);
        self.sequence.sort();
        if self.sequence.len() > 1 {
            self.kind = FileKind::Sequence;
        }
        true
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir.join(self.file_name()).display())
    }
}

fn pad_compatible(a: &Sequence, b: &Sequence) -> bool {
    if a.pad == b.pad {
        return true;
    }
    let fits = |seq: &Sequence, pad: usize| {
        seq.pad == 0
            && seq
                .frames
                .iter()
                .all(|f| f.unsigned_abs().to_string().len() >= pad)
    };
    fits(a, b.pad) || fits(b, a.pad)
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let ext = &name[dot..];
            if ext.len() > 1 && ext[1..].chars().any(|c| !c.is_ascii_digit() && c != '-' && c != ',')
            {
                (&name[..dot], ext)
            } else {
                (name, "")
            }
        }
        _ => (name, ""),
    }
}

/// Trailing digits of `stem`.
fn split_digits(stem: &str) -> Option<(&str, &str)> {
    let start = stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    (start < stem.len()).then(|| stem.split_at(start))
}

/// Trailing range list (digits, `-` and `,`) of `stem`, starting at a digit.
fn split_range(stem: &str) -> Option<(&str, &str)> {
    let bytes = stem.as_bytes();
    let mut start = bytes.len();
    while start > 0 {
        let c = bytes[start - 1];
        if c.is_ascii_digit() || c == b'-' || c == b',' {
            start -= 1;
        } else {
            break;
        }
    }
    while start < bytes.len() && !bytes[start].is_ascii_digit() {
        start += 1;
    }
    if start >= bytes.len() || !bytes[bytes.len() - 1].is_ascii_digit() {
        return None;
    }
    Some((&stem[..start], &stem[start..]))
}

/// List `dir`, aggregating numbered files into sequences for extensions in `sequence_exts`.
///
/// `sequence_exts` holds lower-cased extensions with a leading dot. Entries are sorted by name,
/// directories first.
pub fn list_directory(dir: &Path, sequence_exts: &BTreeSet<String>) -> DjvResult<Vec<FileInfo>> {
    let rd = std::fs::read_dir(dir)
        .with_context(|| format!("list directory '{}'", dir.display()))?;

    let mut dirs = Vec::new();
    let mut files: Vec<FileInfo> = Vec::new();
    for entry in rd {
        let entry = entry.with_context(|| format!("read entry in '{}'", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(FileInfo::directory(&path));
            continue;
        }
        let info = FileInfo::new(&path);
        let seq_ok = sequence_exts.contains(&info.extension_lower());
        if seq_ok && files.iter_mut().any(|f| f.add_to_sequence(&info)) {
            continue;
        }
        files.push(info);
    }

    dirs.sort_by_key(FileInfo::file_name);
    files.sort_by_key(FileInfo::file_name);
    dirs.extend(files);
    Ok(dirs)
}

#[cfg(test)]
#[path = "../tests/unit/file_info.rs"]
mod tests;
