//! StringDB CLI
//!
//! Command-line interface for filling and inspecting a StringDB store.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stringdb::args::{init_tracing, StoreArgs};
use stringdb::source::is_printable;
use stringdb::wal::WalRecovery;
use stringdb::{BatchFiller, FillOptions, RecordStore, Result, StringDbError};

/// StringDB CLI
#[derive(Parser, Debug)]
#[command(name = "stringdb-cli")]
#[command(about = "CLI for the StringDB record store")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Top the store up to TARGET records
    Fill {
        /// Desired total record count
        target: u64,

        /// Print a line for every acknowledged batch
        #[arg(long)]
        progress: bool,
    },

    /// Print the number of stored records
    Count,

    /// Check every record's length, alphabet and key order
    Verify,

    /// Inspect the write-ahead log without modifying it
    WalVerify,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.store.to_config();

    match args.command {
        Commands::Fill { target, progress } => {
            let store = RecordStore::open(config.clone())?;
            let mut filler = BatchFiller::os(FillOptions::from_config(&config));
            let report = filler.start(&store, target, |p| {
                if progress {
                    println!(
                        "progress {}/{} records, batch {}/{}",
                        p.inserted, p.deficit, p.batches_done, p.batches_total
                    );
                }
            })?;
            println!(
                "count {} (inserted {} in {} batches, {:?})",
                report.final_count, report.inserted, report.batches, report.elapsed
            );
        }
        Commands::Count => {
            let store = RecordStore::open(config)?;
            println!("{}", store.count()?);
        }
        Commands::Verify => {
            let store = RecordStore::open(config.clone())?;
            let records = store.records()?;
            let mut previous = 0u64;
            for record in &records {
                if record.key <= previous {
                    return Err(StringDbError::Storage(format!(
                        "key {} follows key {}",
                        record.key, previous
                    )));
                }
                if record.value.len() != config.string_length || !is_printable(&record.value) {
                    return Err(StringDbError::Storage(format!(
                        "record {} has a malformed value",
                        record.key
                    )));
                }
                previous = record.key;
            }
            println!("ok: {} records verified", records.len());
        }
        Commands::WalVerify => {
            let path = config.store_dir().join("wal.log");
            if !path.exists() {
                println!("no WAL at {}", path.display());
                return Ok(());
            }
            let result = WalRecovery::verify(&path)?;
            println!(
                "entries={} corrupted={} last_lsn={} damaged_tail={}",
                result.entries_recovered,
                result.entries_corrupted,
                result.last_lsn,
                result.was_truncated
            );
        }
    }

    Ok(())
}
