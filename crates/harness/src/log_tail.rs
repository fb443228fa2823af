//! Cursor-based pattern scans over an append-only log.
//!
//! A [`LogCursor`] is an immutable position. [`LogStream::scan`] reads from the
//! cursor to the current end of the stream and returns the matching lines together
//! with a new cursor placed right after the last match. When nothing matches the
//! returned cursor equals the input. Non-matching lines after the last match stay
//! visible to the next scan, so scans with different patterns must run in the order
//! their events are expected.
//!
//! Only newline-terminated lines are considered. A trailing partial line is still
//! being written and is left for a later scan.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::trace;

/// Failures reading the log stream.
#[derive(Debug, Error)]
pub enum LogError {
	/// The stream could not be opened.
	#[error("failed to open '{}': {source}", path.display())]
	Open {
		/// Log path.
		path: PathBuf,
		/// Underlying I/O error.
		#[source]
		source: io::Error,
	},
	/// Reading the stream failed mid-scan.
	#[error("failed to read '{}': {source}", path.display())]
	Read {
		/// Log path.
		path: PathBuf,
		/// Underlying I/O error.
		#[source]
		source: io::Error,
	},
	/// The stream shrank below the cursor, so it was truncated or rotated.
	#[error("'{}' shrank to {len} bytes, behind cursor at {offset}", path.display())]
	Truncated {
		/// Log path.
		path: PathBuf,
		/// Current stream length.
		len: u64,
		/// Cursor position.
		offset: u64,
	},
}

/// Position in the log stream plus the last line matched to reach it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCursor {
	offset: u64,
	last_match: Option<String>,
}

impl LogCursor {
	/// Cursor at byte `offset` with no match history.
	pub const fn at(offset: u64) -> Self {
		Self {
			offset,
			last_match: None,
		}
	}

	/// Byte offset of the next unread line.
	pub const fn offset(&self) -> u64 {
		self.offset
	}

	/// Text of the match that placed this cursor, if any.
	pub fn last_match(&self) -> Option<&str> {
		self.last_match.as_deref()
	}
}

/// A line that matched a scan pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedLine {
	/// Offset immediately after the line's terminator.
	pub end_offset: u64,
	/// Line text without the terminator.
	pub text: String,
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
	/// Matching lines in stream order.
	pub matches: Vec<MatchedLine>,
	/// Cursor for the next scan.
	pub cursor: LogCursor,
}

impl Scan {
	/// Number of matching lines.
	pub fn count(&self) -> usize {
		self.matches.len()
	}
}

/// Scans `reader`, which must already be positioned at `cursor`.
pub fn scan_reader<R: BufRead>(mut reader: R, cursor: &LogCursor, pattern: &Regex) -> io::Result<Scan> {
	let mut matches = Vec::new();
	let mut offset = cursor.offset;
	let mut buf = Vec::new();

	loop {
		buf.clear();
		let read = reader.read_until(b'\n', &mut buf)?;
		if read == 0 || buf.last() != Some(&b'\n') {
			break;
		}
		offset += read as u64;

		let line = String::from_utf8_lossy(&buf);
		let line = line.trim_end_matches(['\n', '\r']);
		if pattern.is_match(line) {
			matches.push(MatchedLine {
				end_offset: offset,
				text: line.to_owned(),
			});
		}
	}

	let cursor = match matches.last() {
		Some(last) => LogCursor {
			offset: last.end_offset,
			last_match: Some(last.text.clone()),
		},
		None => cursor.clone(),
	};
	Ok(Scan { matches, cursor })
}

/// Read-only handle on a log file.
#[derive(Debug, Clone)]
pub struct LogStream {
	path: PathBuf,
}

impl LogStream {
	/// Creates a handle; nothing is opened until a cursor is requested.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Log path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Cursor at the current end of the stream; earlier lines are never seen.
	pub fn open_at_end(&self) -> Result<LogCursor, LogError> {
		let len = self.open()?.metadata().map_err(|source| self.read_error(source))?.len();
		trace!(path = %self.path.display(), offset = len, "log cursor at end");
		Ok(LogCursor::at(len))
	}

	/// Collects lines matching `pattern` between `cursor` and the end of the stream.
	pub fn scan(&self, cursor: &LogCursor, pattern: &Regex) -> Result<Scan, LogError> {
		let mut file = self.open()?;
		let len = file.metadata().map_err(|source| self.read_error(source))?.len();
		if len < cursor.offset {
			return Err(LogError::Truncated {
				path: self.path.clone(),
				len,
				offset: cursor.offset,
			});
		}

		file.seek(SeekFrom::Start(cursor.offset))
			.map_err(|source| self.read_error(source))?;
		let scan = scan_reader(BufReader::new(file), cursor, pattern)
			.map_err(|source| self.read_error(source))?;
		trace!(
			path = %self.path.display(),
			pattern = pattern.as_str(),
			from = cursor.offset,
			to = scan.cursor.offset,
			matches = scan.count(),
			"scanned log"
		);
		Ok(scan)
	}

	fn open(&self) -> Result<File, LogError> {
		File::open(&self.path).map_err(|source| LogError::Open {
			path: self.path.clone(),
			source,
		})
	}

	fn read_error(&self, source: io::Error) -> LogError {
		LogError::Read {
			path: self.path.clone(),
			source,
		}
	}
}
