//! Plain-text embedding parser
//!
//! Input is one token per line:
//!
//! ```text
//! token v1 v2 ... vD
//! ```
//!
//! Fields are separated by the ASCII space only. Splitting on any other
//! whitespace would break tokens that legitimately contain U+00A0 and
//! similar characters.
//!
//! The file is memory-mapped. If it is valid UTF-8 it is processed as text;
//! otherwise each line's key is decoded on its own and lines with
//! undecodable keys are skipped.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

/// Default limit on key length, in chars
pub const MAX_KEY_LENGTH: usize = 100;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error(
        "Line {line}: vector for token {token:?} has {actual} dimensions, \
         but previously read vectors have {expected}"
    )]
    DimensionMismatch {
        line: usize,
        token: String,
        expected: usize,
        actual: usize,
    },

    #[error("Line {line}: token {token:?} has no vector components")]
    MissingVector { line: usize, token: String },

    #[error("Line {line}: token {token:?} has non-numeric component {value:?}")]
    InvalidFloat {
        line: usize,
        token: String,
        value: String,
    },

    #[error("No vectors found in input")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Keys longer than this many chars are dropped
    pub max_key_length: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_key_length: MAX_KEY_LENGTH,
        }
    }
}

/// Counters reported after a parse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Non-blank lines seen
    pub lines: usize,
    /// Single-component lines skipped before the dimension was known
    pub headers: usize,
    /// Keys over `max_key_length`
    pub too_long: usize,
    /// Keys that were not valid UTF-8 (byte mode only)
    pub undecodable: usize,
    /// Keys containing NUL
    pub nul_keys: usize,
    /// Whether the input fell back to per-line decoding
    pub byte_mode: bool,
}

/// Output of a parse: keys in file order plus a flat row-major matrix
#[derive(Debug, Clone)]
pub struct ParsedVectors {
    pub keys: Vec<String>,
    pub vectors: Vec<f32>,
    pub dim: usize,
    pub stats: ParseStats,
}

enum Key<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl Key<'_> {
    fn display(&self) -> String {
        match self {
            Key::Text(s) => s.to_string(),
            Key::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

struct Accumulator {
    max_key_length: usize,
    total_lines: usize,
    progress_every: usize,
    dim: Option<usize>,
    keys: Vec<String>,
    vectors: Vec<f32>,
    stats: ParseStats,
}

fn parse_component(raw: &[u8]) -> Option<f32> {
    std::str::from_utf8(raw).ok()?.trim().parse::<f32>().ok()
}

impl Accumulator {
    fn new(options: &ParseOptions, total_lines: usize) -> Self {
        Self {
            max_key_length: options.max_key_length,
            total_lines,
            progress_every: (total_lines / 100).max(1),
            dim: None,
            keys: Vec::new(),
            vectors: Vec::new(),
            stats: ParseStats::default(),
        }
    }

    fn push(&mut self, line: usize, key: Key<'_>, values: &[&[u8]]) -> Result<(), ParseError> {
        self.stats.lines += 1;
        if line % self.progress_every == 0 {
            tracing::debug!(
                "Parsing vectors: {:.0}% ({}/{})",
                line as f64 / self.total_lines as f64 * 100.0,
                line,
                self.total_lines
            );
        }

        let actual = values.len();
        match self.dim {
            None if actual > 1 => {
                self.dim = Some(actual);
                // Optimistic: every remaining line is a row
                let remaining = self.total_lines.saturating_sub(line - 1);
                self.vectors.reserve(remaining * actual);
            }
            None if actual == 1 => {
                tracing::warn!(
                    "Skipping token {:?} with 1-dimensional vector {:?}; likely a header",
                    key.display(),
                    String::from_utf8_lossy(values[0])
                );
                self.stats.headers += 1;
                return Ok(());
            }
            _ if actual == 0 => {
                return Err(ParseError::MissingVector {
                    line,
                    token: key.display(),
                })
            }
            Some(expected) if expected != actual => {
                return Err(ParseError::DimensionMismatch {
                    line,
                    token: key.display(),
                    expected,
                    actual,
                })
            }
            _ => {}
        }

        let key = match key {
            Key::Text(s) => s,
            Key::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => s,
                Err(_) => {
                    tracing::info!("Skipping non-UTF8 token {:?}", String::from_utf8_lossy(b));
                    self.stats.undecodable += 1;
                    return Ok(());
                }
            },
        };

        if key.len() > self.max_key_length && key.chars().count() > self.max_key_length {
            self.stats.too_long += 1;
            return Ok(());
        }
        if key.contains('\0') {
            tracing::warn!("Skipping token {:?} containing NUL", key);
            self.stats.nul_keys += 1;
            return Ok(());
        }

        let start = self.vectors.len();
        for raw in values {
            match parse_component(raw) {
                Some(v) => self.vectors.push(v),
                None => {
                    self.vectors.truncate(start);
                    return Err(ParseError::InvalidFloat {
                        line,
                        token: key.to_string(),
                        value: String::from_utf8_lossy(raw).into_owned(),
                    });
                }
            }
        }
        self.keys.push(key.to_string());
        Ok(())
    }

    fn finish(mut self) -> Result<ParsedVectors, ParseError> {
        let dim = match self.dim {
            Some(dim) if !self.keys.is_empty() => dim,
            _ => return Err(ParseError::Empty),
        };
        // Dropped lines leave unused reserved rows behind
        self.vectors.shrink_to_fit();

        Ok(ParsedVectors {
            keys: self.keys,
            vectors: self.vectors,
            dim,
            stats: self.stats,
        })
    }
}

/// Parse an in-memory embedding file
pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> Result<ParsedVectors, ParseError> {
    let total_lines = bytes.iter().filter(|&&b| b == b'\n').count() + 1;
    let mut acc = Accumulator::new(options, total_lines);
    let mut values: Vec<&[u8]> = Vec::new();

    match std::str::from_utf8(bytes) {
        Ok(text) => {
            for (i, line) in text.split('\n').enumerate() {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                let mut fields = line.split(' ');
                let key = fields.next().unwrap_or_default();
                values.clear();
                values.extend(fields.map(str::as_bytes));
                acc.push(i + 1, Key::Text(key), &values)?;
            }
        }
        Err(_) => {
            tracing::warn!(
                "Input is not valid UTF-8; reading as bytes and skipping tokens with malformed UTF-8"
            );
            acc.stats.byte_mode = true;
            for (i, line) in bytes.split(|&b| b == b'\n').enumerate() {
                let line = line.trim_ascii_end();
                if line.is_empty() {
                    continue;
                }
                let mut fields = line.split(|&b| b == b' ');
                let key = fields.next().unwrap_or_default();
                values.clear();
                values.extend(fields);
                acc.push(i + 1, Key::Bytes(key), &values)?;
            }
        }
    }

    acc.finish()
}

/// Parse an embedding file from disk
pub fn parse_file<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<ParsedVectors, ParseError> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return Err(ParseError::Empty);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    parse_bytes(&mmap, options)
}
