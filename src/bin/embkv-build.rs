//! embkv Build Binary
//!
//! Bulk-loads a word embedding corpus into a new store.

use anyhow::Context;
use clap::Parser;
use embkv::{ByteOrder, Store, StoreConfig};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// embkv Build - load a `.vec` corpus into a persistent store
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Store directory (created if missing, must not hold a store yet)
    #[arg(short, long)]
    db: PathBuf,

    /// Corpus file in `.vec` format, or `-` to read stdin
    #[arg(short, long)]
    corpus: PathBuf,

    /// Byte order of stored vectors (`big` or `little`)
    #[arg(long, default_value_t = ByteOrder::BigEndian)]
    byte_order: ByteOrder,

    /// Capacity of the queue between the parser and the writer
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,

    /// Log progress every N records (0 = never)
    #[arg(long, default_value_t = 1_000_000)]
    progress_interval: u64,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("embkv=info".parse()?))
        .init();

    let args = Args::parse();

    let config = StoreConfig::default()
        .with_byte_order(args.byte_order)
        .with_queue_capacity(args.queue_capacity)
        .with_progress_interval(args.progress_interval);

    let mut store = Store::open_with(&args.db, config)
        .with_context(|| format!("failed to open store at {}", args.db.display()))?;

    info!(
        "Building store at {} from {}",
        args.db.display(),
        args.corpus.display()
    );

    if args.corpus.as_os_str() == "-" {
        store.build_db(io::stdin())?;
    } else {
        let file = File::open(&args.corpus)
            .with_context(|| format!("failed to open corpus {}", args.corpus.display()))?;
        store.build_db(file)?;
    }

    if let Some(info) = store.info() {
        println!("{}", info);
    }
    store.close()?;

    Ok(())
}
