//! StringDB Worker Binary
//!
//! Reads start commands (`{"stringArraySize": N}`, one per line) from stdin
//! and writes worker events to stdout as JSON lines.

use std::io::{self, BufRead, Write};
use std::thread;

use clap::Parser;
use stringdb::args::{init_tracing, StoreArgs};
use stringdb::{StartCommand, Worker, WorkerEvent};

/// StringDB fill worker
#[derive(Parser, Debug)]
#[command(name = "stringdb-worker")]
#[command(about = "Fill a StringDB store to the sizes requested on stdin")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,
}

fn main() {
    init_tracing();

    let args = Args::parse();
    let config = args.store.to_config();

    tracing::info!("StringDB worker v{}", stringdb::VERSION);
    tracing::info!("Store: {}", config.store_dir().display());

    let handle = match Worker::spawn(config) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start worker: {}", e);
            std::process::exit(1);
        }
    };

    // Forward events until the worker drops its sender
    let events = handle.events().clone();
    let printer = thread::spawn(move || {
        let stdout = io::stdout();
        for event in events {
            print_event(&mut stdout.lock(), &event);
        }
    });

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let sent = StartCommand::parse(&line).and_then(|message| handle.send(message));
        if let Err(e) = sent {
            tracing::warn!("Rejected command {:?}: {}", line, e);
            print_event(
                &mut io::stdout().lock(),
                &WorkerEvent::Failed {
                    error: e.to_string(),
                },
            );
        }
    }

    if let Err(e) = handle.shutdown() {
        tracing::error!("Worker error: {}", e);
    }
    let _ = printer.join();

    tracing::info!("Worker stopped");
}

fn print_event(out: &mut impl Write, event: &WorkerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = writeln!(out, "{}", json);
            let _ = out.flush();
        }
        Err(e) => tracing::error!("Cannot encode event {:?}: {}", event, e),
    }
}
