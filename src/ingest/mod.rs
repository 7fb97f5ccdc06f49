//! Corpus Ingestion
//!
//! Streaming parse and validation of embedding corpora.

mod parser;
mod pipeline;

pub use parser::{parse_header, parse_record, CorpusReader, Header, Record, SENTINEL_KEY};
pub use pipeline::{Ingestor, RecordItem, RecordStream};
