//! Corpus Parser
//!
//! Line-oriented reader for fastText `.vec` style corpora:
//!
//! ```text
//! <vocab_count> <dimension>
//! <word> <f_1> <f_2> ... <f_D>
//! ...
//! ```

use std::io::BufRead;

use crate::error::{FormatError, Result};

/// Key stored for a record whose word token is empty
pub const SENTINEL_KEY: &str = " ";

/// Parsed corpus header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Declared vocabulary size (informational only)
    pub vocab_count: Option<u64>,
    /// Embedding dimension every record must match
    pub dimension: usize,
}

/// One embedding record from the corpus
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub word: String,
    pub vector: Vec<f64>,
    /// 1-based line number in the corpus (the header is line 1)
    pub line: u64,
}

/// Parse the header line. The second token is the dimension.
pub fn parse_header(line: &str) -> Result<Header, FormatError> {
    let mut tokens = line.split_ascii_whitespace();
    let vocab_count = tokens.next().and_then(|t| t.parse().ok());
    let dimension = tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| FormatError::InvalidHeader {
            header: line.to_string(),
        })?;

    Ok(Header {
        vocab_count,
        dimension,
    })
}

/// Parse one record line against the declared dimension.
///
/// Only ASCII whitespace separates fields; words may contain other Unicode
/// spaces such as U+00A0 or U+3000.
pub fn parse_record(line: &str, line_no: u64, dimension: usize) -> Result<Record, FormatError> {
    let (word, remainder) = line
        .split_once(|c: char| c.is_ascii_whitespace())
        .unwrap_or((line, ""));
    let word = if word.is_empty() { SENTINEL_KEY } else { word };

    let tokens: Vec<&str> = remainder.split_ascii_whitespace().collect();
    if tokens.len() != dimension {
        return Err(FormatError::DimensionMismatch {
            line: line_no,
            word: word.to_string(),
            expected: dimension,
            actual: tokens.len(),
        });
    }

    let mut vector = Vec::with_capacity(dimension);
    for token in tokens {
        let value = token.parse::<f64>().map_err(|_| FormatError::InvalidNumber {
            line: line_no,
            word: word.to_string(),
            token: token.to_string(),
        })?;
        vector.push(value);
    }

    Ok(Record {
        word: word.to_string(),
        vector,
        line: line_no,
    })
}

/// Streaming record reader over a buffered corpus
///
/// The header is consumed by [`CorpusReader::new`]; iteration yields one
/// record per remaining line and stops for good after the first error.
pub struct CorpusReader<R> {
    reader: R,
    header: Header,
    line_no: u64,
    buf: String,
    done: bool,
}

impl<R: BufRead> CorpusReader<R> {
    /// Read and validate the header line
    pub fn new(mut reader: R) -> Result<Self> {
        let mut buf = String::new();
        if reader.read_line(&mut buf)? == 0 {
            return Err(FormatError::MissingHeader.into());
        }
        let header = parse_header(trim_newline(&buf))?;

        Ok(Self {
            reader,
            header,
            line_no: 1,
            buf,
            done: false,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn dimension(&self) -> usize {
        self.header.dimension
    }

    /// Number of lines consumed so far, header included
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let record = parse_record(trim_newline(&self.buf), self.line_no, self.header.dimension)?;
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn trim_newline(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
