//! embkv CLI
//!
//! Looks up word vectors from the command line or an interactive prompt.

use anyhow::Context;
use clap::Parser;
use embkv::{ByteOrder, Store, StoreConfig};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// embkv CLI - Interactive Lookup
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Store directory
    #[arg(short, long)]
    db: PathBuf,

    /// Load the whole store into memory before querying
    #[arg(long)]
    in_memory: bool,

    /// Byte order the store was built with (`big` or `little`)
    #[arg(long, default_value_t = ByteOrder::BigEndian)]
    byte_order: ByteOrder,

    /// Words to look up; starts an interactive prompt when empty
    words: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("embkv=info".parse()?))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = StoreConfig::default().with_byte_order(args.byte_order);

    let store = if args.in_memory {
        Store::open_in_memory_with(&args.db, config)
    } else {
        Store::open_with(&args.db, config)
    }
    .with_context(|| format!("failed to open store at {}", args.db.display()))?;

    if !args.words.is_empty() {
        for word in &args.words {
            print_lookup(&store, word);
        }
        store.close()?;
        return Ok(());
    }

    println!("Opened {} ({}).", store.kind(), store.state());
    println!("Type 'help' for available commands, 'quit' to exit.\n");

    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        print!("embkv> ");
        io::stdout().flush()?;

        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let line = input.trim_end_matches(['\n', '\r']);
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

        match cmd.to_ascii_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => print_help(),
            "get" => {
                if rest.is_empty() {
                    eprintln!("Error: GET requires a word: GET <word>");
                } else {
                    print_lookup(&store, rest);
                }
            }
            "info" => match store.info() {
                Some(info) => println!("{}", info),
                None => println!("(store is {})", store.state()),
            },
            "stats" => println!("{}", store.metrics().summary()),
            other => eprintln!(
                "Error: Unknown command: {}. Type 'help' for available commands.",
                other
            ),
        }
    }

    store.close()?;
    Ok(())
}

fn print_lookup(store: &Store, word: &str) {
    match store.get_emb(word) {
        Ok(vec) => println!("{:?} ({} dims): {:?}", word, vec.len(), vec),
        Err(e) if e.is_not_found() => println!("{:?}: (not found)", word),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn print_help() {
    println!(
        r#"
Available commands:

  GET <word>        - Print the embedding for a word
                      (everything after the first space is the word,
                       so `GET  ` looks up the blank-word entry)
  INFO              - Show store summary
  STATS             - Show lookup counters and latency

  help              - Show this help
  quit / exit       - Exit the CLI
"#
    );
}
