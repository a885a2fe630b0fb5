//! Fill Worker
//!
//! Background thread that owns the store and services control messages.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, StringDbError};
use crate::filler::{BatchFiller, CancellationToken, FillOptions, FillReport};
use crate::source::{EntropySource, OsEntropy, RandomStringSource};
use crate::store::{check_capability, RecordStore, StoreEvent};

use super::{ControlMessage, WorkerEvent};

/// Spawns fill workers
pub struct Worker<E: EntropySource = OsEntropy> {
    config: Config,
    filler: BatchFiller<E>,
    commands: Receiver<ControlMessage>,
    events: Sender<WorkerEvent>,
    store: Option<(RecordStore, Receiver<StoreEvent>)>,
    /// Persistent storage missing: every fill is a no-op
    degraded: bool,
}

/// Invoker's side of a running worker
pub struct WorkerHandle {
    commands: Sender<ControlMessage>,
    events: Receiver<WorkerEvent>,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl Worker<OsEntropy> {
    /// Start a worker using operating system entropy
    pub fn spawn(config: Config) -> Result<WorkerHandle> {
        Self::spawn_with(config, RandomStringSource::os())
    }
}

impl<E: EntropySource + 'static> Worker<E> {
    /// Start a worker with an explicit string source
    pub fn spawn_with(config: Config, source: RandomStringSource<E>) -> Result<WorkerHandle> {
        config.validate()?;

        let (command_tx, command_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::unbounded();
        let cancel = CancellationToken::new();

        let filler = BatchFiller::new(source, FillOptions::from_config(&config))
            .with_cancellation(cancel.clone());

        let worker = Worker {
            config,
            filler,
            commands: command_rx,
            events: event_tx,
            store: None,
            degraded: false,
        };

        let thread = thread::Builder::new()
            .name("stringdb-worker".to_string())
            .spawn(move || worker.run())?;

        Ok(WorkerHandle {
            commands: command_tx,
            events: event_rx,
            cancel,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        // Capability check happens before any store operation
        if let Err(e) = check_capability(&self.config) {
            warn!(error = %e, "persistent storage unavailable, running in no-op mode");
            self.degraded = true;
            self.emit(WorkerEvent::Notice {
                message: format!(
                    "Persistent storage is not available ({}); strings will not be stored.",
                    e
                ),
            });
        }

        while let Ok(message) = self.commands.recv() {
            match message {
                ControlMessage::Start { target } => self.handle_start(target),
                ControlMessage::Shutdown => break,
            }
        }

        // The connection closes once no other handle in the process uses it
        self.store = None;
        debug!("worker stopped");
    }

    fn handle_start(&mut self, target: u64) {
        if self.degraded {
            self.emit(WorkerEvent::Done(FillReport {
                target,
                initial_count: 0,
                inserted: 0,
                batches: 0,
                final_count: 0,
                elapsed: Duration::ZERO,
            }));
            return;
        }

        let store = match self.current_store() {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "cannot open store");
                self.emit(WorkerEvent::Failed {
                    error: e.to_string(),
                });
                return;
            }
        };

        // A cancel only reaches the fill that is running when it arrives
        self.filler.cancellation_token().reset();

        let events = self.events.clone();
        let result = self.filler.start(&store, target, |progress| {
            let _ = events.send(WorkerEvent::Progress(*progress));
        });

        match result {
            Ok(report) => self.emit(WorkerEvent::Done(report)),
            Err(e) => {
                if let StringDbError::StoreOutdated { .. } = e {
                    self.drain_store_events();
                }
                self.emit(WorkerEvent::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Open handle, reopening when the previous one was closed underneath us
    fn current_store(&mut self) -> Result<RecordStore> {
        self.drain_store_events();

        if let Some((store, _)) = &self.store {
            if !store.is_closed() {
                return Ok(store.clone());
            }
            info!("reopening outdated store");
        }

        let store = RecordStore::open(self.config.clone())?;
        let events = store.subscribe();
        self.store = Some((store.clone(), events));
        Ok(store)
    }

    /// Turn pending store notifications into user-visible notices
    fn drain_store_events(&mut self) {
        let mut notices = Vec::new();
        if let Some((_, events)) = &self.store {
            loop {
                match events.try_recv() {
                    Ok(StoreEvent::VersionChange { old, new }) => notices.push(format!(
                        "Store outdated (schema v{} replaced by v{}), reload required.",
                        old, new
                    )),
                    Ok(StoreEvent::Closed) => {}
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }
        for message in notices {
            self.emit(WorkerEvent::Notice { message });
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // Invoker may have dropped its receiver
        let _ = self.events.send(event);
    }
}

impl WorkerHandle {
    /// Ask the worker to fill the store to `target` records
    pub fn start(&self, target: u64) -> Result<()> {
        self.send(ControlMessage::Start { target })
    }

    pub fn send(&self, message: ControlMessage) -> Result<()> {
        self.commands
            .send(message)
            .map_err(|_| StringDbError::Protocol("worker has stopped".into()))
    }

    /// Stop the running fill at the next batch boundary
    ///
    /// Starts still queued behind it run normally.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    /// Block until the next `Done` or `Failed`, collecting everything before it
    pub fn wait_for_outcome(&self) -> Result<Vec<WorkerEvent>> {
        let mut seen = Vec::new();
        for event in self.events.iter() {
            let terminal = matches!(event, WorkerEvent::Done(_) | WorkerEvent::Failed { .. });
            seen.push(event);
            if terminal {
                return Ok(seen);
            }
        }
        Err(StringDbError::Protocol("worker stopped without an outcome".into()))
    }

    /// Finish the current fill, stop the worker and wait for it
    pub fn shutdown(mut self) -> Result<()> {
        let _ = self.commands.send(ControlMessage::Shutdown);
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| StringDbError::Protocol("worker thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(ControlMessage::Shutdown);
        let _ = self.join();
    }
}
