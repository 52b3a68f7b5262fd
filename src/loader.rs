//! Reads LS-8 program listings
//!
//! A listing holds one byte per line, written as a binary literal of up to 8
//! digits. Anything after a `#` is a comment and blank lines are skipped:
//!
//! ```text
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 01000111 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```

use std::fs;
use std::io;
use std::path::Path;

use crate::region::Program;
use crate::vm::MEMORY_SIZE;

pub type Result<T> = std::result::Result<T, LoadError>;

/// An error that prevented a program from being loaded
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
  #[error("line {line}: `{text}` is not an 8-bit binary literal")]
  InvalidLiteral { line: usize, text: String },

  #[error("program does not fit in {capacity} bytes of memory")]
  TooLarge { capacity: usize },

  #[error("could not read program listing")]
  Io(#[from] io::Error),
}

const COMMENT: char = '#';

/// Parse a listing, line by line, into a program image
pub fn parse<I, S>(lines: I) -> Result<Program>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut bytes = Vec::new();
  for (index, line) in lines.into_iter().enumerate() {
    let Some(byte) = parse_line(index + 1, line.as_ref())? else {
      continue;
    };
    if bytes.len() == MEMORY_SIZE {
      return Err(LoadError::TooLarge {
        capacity: MEMORY_SIZE,
      });
    }
    bytes.push(byte);
  }
  log::debug!("parsed listing into {} bytes", bytes.len());
  Ok(bytes.into())
}

pub fn parse_str(source: &str) -> Result<Program> {
  parse(source.lines())
}

/// Read and parse the listing stored at `path`
pub fn load_file<P>(path: P) -> Result<Program>
where
  P: AsRef<Path>,
{
  let source = fs::read_to_string(path)?;
  parse_str(&source)
}

fn parse_line(line: usize, raw: &str) -> Result<Option<u8>> {
  let code = match raw.split_once(COMMENT) {
    Some((code, _comment)) => code,
    None => raw,
  };
  let text = code.trim();
  if text.is_empty() {
    return Ok(None);
  }
  let invalid = || LoadError::InvalidLiteral {
    line,
    text: text.to_owned(),
  };
  // from_str_radix would also take a leading sign
  if text.len() > 8 || !text.bytes().all(|b| b == b'0' || b == b'1') {
    return Err(invalid());
  }
  u8::from_str_radix(text, 2).map(Some).map_err(|_| invalid())
}
