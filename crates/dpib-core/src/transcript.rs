//! Append-only benchmark transcript
//!
//! The transcript is a flat text file mixing narration with actionable
//! segments (candidate configurations an operator may want to apply).
//! Actionable segments are wrapped in `{` `}` on disk; the delimiters
//! are never escaped, so narration must not contain them.

use crate::error::Result;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Opening delimiter of an actionable segment
pub const ACTIONABLE_OPEN: char = '{';
/// Closing delimiter of an actionable segment
pub const ACTIONABLE_CLOSE: char = '}';

/// One piece of transcript output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment text, without delimiters
    pub text: String,
    /// Whether the segment is a command rather than narration
    pub actionable: bool,
}

impl Segment {
    /// Plain narration segment
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actionable: false,
        }
    }

    /// Actionable segment
    pub fn actionable(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actionable: true,
        }
    }
}

/// File-backed transcript writer/reader
pub struct Transcript {
    path: PathBuf,
    write_lock: Mutex<()>,
    listener: Mutex<Option<mpsc::UnboundedSender<Segment>>>,
}

impl Transcript {
    /// Use `path` as the transcript file. Nothing is created until the
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    /// Location of the transcript file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Receive every segment appended from now on.
    ///
    /// Only one subscriber is kept; subscribing again replaces it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Segment> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.listener.lock() = Some(tx);
        rx
    }

    /// Drop the current subscriber; its receiver drains and then closes
    pub fn unsubscribe(&self) {
        *self.listener.lock() = None;
    }

    /// Append a narration segment
    pub fn append(&self, text: &str) -> Result<()> {
        self.write(text)?;
        self.notify(Segment::plain(text));
        Ok(())
    }

    /// Append an actionable segment
    pub fn append_actionable(&self, text: &str) -> Result<()> {
        self.write(&format!("{ACTIONABLE_OPEN}{text}{ACTIONABLE_CLOSE}"))?;
        self.notify(Segment::actionable(text));
        Ok(())
    }

    /// Truncate the transcript before a new run
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, "")?;
        Ok(())
    }

    /// Raw stored text; a missing file reads as empty
    pub fn read_raw(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reconstruct the stored segments
    pub fn replay(&self) -> Result<Vec<Segment>> {
        Ok(parse(&self.read_raw()?))
    }

    /// Whether anything has been written since the last clear
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_raw()?.is_empty())
    }

    fn write(&self, text: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    fn notify(&self, segment: Segment) {
        let mut listener = self.listener.lock();
        if let Some(tx) = listener.as_ref() {
            if tx.send(segment).is_err() {
                *listener = None;
            }
        }
    }
}

/// Split stored transcript text into segments.
///
/// Pieces between delimiters alternate plain/actionable. An odd number of
/// delimiters means the last piece was never closed; it is returned as
/// plain text. Empty pieces are skipped.
pub fn parse(raw: &str) -> Vec<Segment> {
    let pieces: Vec<&str> = raw.split([ACTIONABLE_OPEN, ACTIONABLE_CLOSE]).collect();
    let unterminated = pieces.len() % 2 == 0;
    let last = pieces.len().saturating_sub(1);

    pieces
        .into_iter()
        .enumerate()
        .filter(|(_, piece)| !piece.is_empty())
        .map(|(index, piece)| {
            let actionable = index % 2 == 1 && !(unterminated && index == last);
            Segment {
                text: piece.to_string(),
                actionable,
            }
        })
        .collect()
}
