//! lsmkv CLI
//!
//! Command-line interface operating directly on an lsmkv data directory.

use std::process;

use clap::{Parser, Subcommand};
use lsmkv::{Config, Engine, Record, WalSyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// lsmkv CLI
#[derive(Parser, Debug)]
#[command(name = "lsmkv-cli")]
#[command(about = "CLI for the lsmkv storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./lsmkv_data")]
    data_dir: String,

    /// MemTable size limit in KB before flush
    #[arg(short = 'm', long, default_value = "1000")]
    memtable_kb: usize,

    /// fsync the WAL every N writes instead of every write
    #[arg(long)]
    sync_every: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List keys, optionally under a prefix
    Keys {
        /// Only keys starting with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Start at this key (inclusive)
        #[arg(short, long)]
        cursor: Option<String>,

        /// Page size
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Records with key >= KEY, ascending
    Ff {
        key: String,
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Records with key <= KEY, descending
    Fb {
        key: String,
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Flush the MemTable to level 0
    Flush,

    /// Compact a level into the next one
    Compact {
        level: usize,
    },

    /// Show level fill ratios, fullest first
    Ratios,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lsmkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let wal_sync_strategy = match args.sync_every {
        Some(count) => WalSyncStrategy::EveryNEntries { count },
        None => WalSyncStrategy::EveryWrite,
    };
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(args.memtable_kb * 1000)
        .wal_sync_strategy(wal_sync_strategy)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> lsmkv::Result<()> {
    match command {
        Commands::Get { key } => match engine.get_value(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            engine.set(key, value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.remove(key)?;
            println!("OK");
        }
        Commands::Keys {
            prefix,
            cursor,
            count,
        } => {
            let page = engine.get_keys_cursor_prefix(
                prefix.as_bytes(),
                cursor.as_deref().map(str::as_bytes),
                count,
            )?;
            for key in &page.items {
                println!("{}", String::from_utf8_lossy(key));
            }
            print_next(page.next.as_deref());
        }
        Commands::Ff { key, count } => {
            let page = engine.get_ff(key.as_bytes(), count)?;
            print_records(&page.items);
            print_next(page.next.as_deref());
        }
        Commands::Fb { key, count } => {
            let page = engine.get_fb(key.as_bytes(), count)?;
            print_records(&page.items);
            print_next(page.next.as_deref());
        }
        Commands::Flush => {
            engine.flush_mem_table()?;
            println!("OK");
        }
        Commands::Compact { level } => {
            if engine.compact_level(level)? {
                println!("OK");
            } else {
                println!("level {} is empty", level);
            }
        }
        Commands::Ratios => {
            for (level, ratio) in engine.get_fill_ratios() {
                println!("level {}: {:.4}", level, ratio);
            }
        }
    }
    Ok(())
}

fn print_records(records: &[Record]) {
    for record in records {
        println!(
            "{} = {}",
            String::from_utf8_lossy(record.key()),
            String::from_utf8_lossy(record.value())
        );
    }
}

fn print_next(next: Option<&[u8]>) {
    if let Some(next) = next {
        println!("-- next: {}", String::from_utf8_lossy(next));
    }
}
