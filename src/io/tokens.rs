//! Whitespace-separated token streams.
//!
//! Numbers are written with Rust's shortest round-trip `f64` formatting, so
//! reading back what was written yields bit-identical values.

use super::IoError;
use nalgebra::Vector3;
use std::iter::Peekable;
use std::str::SplitWhitespace;

/// Sequential reader over the whitespace-separated tokens of a string.
///
/// A reader may be scoped to a fixed-length record with
/// [`TokenReader::begin_record`]; running out of tokens then reports how many
/// of the record's tokens were present.
pub struct TokenReader<'a> {
    tokens: Peekable<SplitWhitespace<'a>>,
    line: usize,
    consumed: usize,
    record_start: usize,
    record_len: Option<usize>,
}

impl<'a> TokenReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_line(input, 0)
    }

    /// Reader whose errors carry the given 1-based line number.
    pub fn with_line(input: &'a str, line: usize) -> Self {
        Self {
            tokens: input.split_whitespace().peekable(),
            line,
            consumed: 0,
            record_start: 0,
            record_len: None,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Number of tokens consumed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Start a record of `len` tokens at the current position.
    pub fn begin_record(&mut self, len: usize) {
        self.record_start = self.consumed;
        self.record_len = Some(len);
    }

    /// True once every token has been consumed.
    pub fn is_exhausted(&mut self) -> bool {
        self.tokens.peek().is_none()
    }

    pub fn next_token(&mut self) -> Result<&'a str, IoError> {
        match self.tokens.next() {
            Some(token) => {
                self.consumed += 1;
                Ok(token)
            }
            None => {
                let found = self.consumed - self.record_start;
                Err(IoError::UnexpectedEof {
                    expected: self.record_len.unwrap_or(found + 1),
                    found,
                })
            }
        }
    }

    pub fn next_f64(&mut self) -> Result<f64, IoError> {
        let token = self.next_token()?;
        token.parse::<f64>().map_err(|_| IoError::InvalidNumber {
            line: self.line,
            value: token.to_string(),
        })
    }

    pub fn next_usize(&mut self) -> Result<usize, IoError> {
        let token = self.next_token()?;
        token.parse::<usize>().map_err(|_| IoError::InvalidNumber {
            line: self.line,
            value: token.to_string(),
        })
    }

    pub fn next_vector3(&mut self) -> Result<Vector3<f64>, IoError> {
        Ok(Vector3::new(
            self.next_f64()?,
            self.next_f64()?,
            self.next_f64()?,
        ))
    }

    pub fn next_f64_array<const N: usize>(&mut self) -> Result<[f64; N], IoError> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.next_f64()?;
        }
        Ok(values)
    }
}

/// Write `values` separated by single spaces, without leading or trailing whitespace.
///
/// Each value is formatted with `{}`, the shortest text that parses back to the
/// same `f64`. Foreign spellings such as `1e-05` are not preserved.
pub fn write_tokens<W, I>(out: &mut W, values: I) -> std::io::Result<()>
where
    W: std::io::Write,
    I: IntoIterator<Item = f64>,
{
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{value}")?;
    }
    Ok(())
}
