//! Ingest Pipeline
//!
//! Runs the corpus parser as a producer thread feeding a bounded queue.
//! The bulk writer drains the queue on the calling thread; when the queue is
//! full the producer blocks, so the records in flight stay proportional to
//! the queue capacity rather than the corpus size. The disk writer still
//! keeps one key map entry per loaded word until the index is built (see
//! [`DiskBackend::pending_keys`](crate::storage::DiskBackend::pending_keys)),
//! so load-time memory grows with the vocabulary size.

use crossbeam::channel::{self, Receiver, Sender};
use std::io::BufRead;
use std::thread;
use tracing::debug;

use super::parser::{CorpusReader, Header, Record};
use crate::error::{Error, Result};

/// Item carried by the record queue. An `Err` is always the last item.
pub type RecordItem = Result<Record>;

/// Producer side of the pipeline
pub struct Ingestor<R> {
    corpus: CorpusReader<R>,
    capacity: usize,
}

impl<R: BufRead + Send> Ingestor<R> {
    /// Parse the corpus header and prepare a pipeline with the given queue capacity.
    ///
    /// A bad header fails here, before any record is produced.
    pub fn new(reader: R, capacity: usize) -> Result<Self> {
        let corpus = CorpusReader::new(reader)?;
        Ok(Self {
            corpus,
            capacity: capacity.max(1),
        })
    }

    pub fn header(&self) -> Header {
        self.corpus.header()
    }

    pub fn dimension(&self) -> usize {
        self.corpus.dimension()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start the producer and hand the consuming end to `consume`.
    ///
    /// The producer is joined before returning. If `consume` stops early the
    /// queue is dropped with it, and the producer exits at its next send.
    pub fn run<T, F>(self, consume: F) -> Result<T>
    where
        F: FnOnce(RecordStream) -> T,
    {
        let (sender, receiver) = channel::bounded(self.capacity);
        let stream = RecordStream {
            receiver,
            capacity: self.capacity,
        };
        let corpus = self.corpus;

        thread::scope(|s| -> Result<T> {
            let producer = thread::Builder::new()
                .name("embkv-ingest".to_string())
                .spawn_scoped(s, move || produce(corpus, sender))?;

            let out = consume(stream);

            let sent = producer
                .join()
                .map_err(|_| Error::storage("ingest producer panicked"))?;
            debug!(records = sent, "Ingest producer finished");
            Ok(out)
        })
    }
}

fn produce<R: BufRead>(corpus: CorpusReader<R>, sender: Sender<RecordItem>) -> u64 {
    let mut sent = 0;
    for item in corpus {
        let failed = item.is_err();
        if sender.send(item).is_err() {
            debug!("Record queue closed by consumer");
            break;
        }
        if failed {
            break;
        }
        sent += 1;
    }
    sent
}

/// Consumer side of the pipeline: a blocking iterator over queued records
pub struct RecordStream {
    receiver: Receiver<RecordItem>,
    capacity: usize,
}

impl RecordStream {
    /// Records currently waiting in the queue (approximate)
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Iterator for RecordStream {
    type Item = RecordItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use std::io::Cursor;
    use std::time::Duration;

    fn corpus(n: usize) -> String {
        let mut s = format!("{} 2\n", n);
        for i in 0..n {
            s.push_str(&format!("w{} {}.0 {}.5\n", i, i, i));
        }
        s
    }

    #[test]
    fn test_records_arrive_in_order() {
        let ingestor = Ingestor::new(Cursor::new(corpus(50)), 4).unwrap();
        assert_eq!(ingestor.dimension(), 2);

        let words = ingestor
            .run(|stream| {
                stream
                    .map(|r| r.unwrap().word)
                    .collect::<Vec<_>>()
            })
            .unwrap();

        assert_eq!(words.len(), 50);
        assert_eq!(words[0], "w0");
        assert_eq!(words[49], "w49");
    }

    #[test]
    fn test_queue_is_bounded() {
        let ingestor = Ingestor::new(Cursor::new(corpus(100)), 3).unwrap();

        let (peak, total) = ingestor
            .run(|stream| {
                // Give the producer time to fill the queue and block
                std::thread::sleep(Duration::from_millis(100));
                let peak = stream.queued();
                assert!(peak <= stream.capacity());
                (peak, stream.count())
            })
            .unwrap();

        assert_eq!(peak, 3);
        assert_eq!(total, 100);
    }

    #[test]
    fn test_error_ends_stream() {
        let data = "4 2\na 1 2\nb 3\nc 5 6\nd 7 8\n";
        let ingestor = Ingestor::new(Cursor::new(data), 8).unwrap();

        let items = ingestor.run(|stream| stream.collect::<Vec<_>>()).unwrap();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(Error::Format(FormatError::DimensionMismatch { line: 3, .. }))
        ));
    }

    #[test]
    fn test_consumer_can_stop_early() {
        let ingestor = Ingestor::new(Cursor::new(corpus(1000)), 1).unwrap();
        let first = ingestor
            .run(|mut stream| stream.next().map(|r| r.unwrap().word))
            .unwrap();
        assert_eq!(first.as_deref(), Some("w0"));
    }

    #[test]
    fn test_bad_header_fails_before_run() {
        let err = Ingestor::new(Cursor::new("garbage\na 1 2\n"), 4).err().unwrap();
        assert!(matches!(
            err,
            Error::Format(FormatError::InvalidHeader { .. })
        ));
    }
}
