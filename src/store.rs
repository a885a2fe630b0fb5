//! Record Store
//!
//! Cloneable handle over an [`Engine`] plus its single writer thread.
//!
//! ## Write Path
//! ```text
//!  insert_batch(values) ──► bounded queue ──► writer thread ──► Engine
//!         │                                        │
//!         └──────────── BatchTicket ◄──── reply ───┘
//! ```
//!
//! Batches are applied in submission order. Submitting does not wait for
//! the batch to commit; the returned [`BatchTicket`] does.
//!
//! ## Version Changes
//! Opening a store that is already open in this process at a lower schema
//! version closes the older connection first: its subscribers receive
//! [`StoreEvent::VersionChange`] and every later call on it fails with
//! `StoreOutdated`. The owner must open a fresh handle.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, StringDbError};
use crate::record::{KeyRange, StringRecord};
use crate::schema::Schema;

/// Notifications delivered to store subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A newer schema version was opened; this handle is now closed
    VersionChange { old: u32, new: u32 },
    /// The handle was closed by its owner
    Closed,
}

/// Completion signal for one submitted batch
pub struct BatchTicket {
    reply: Receiver<Result<KeyRange>>,
}

impl BatchTicket {
    pub fn new(reply: Receiver<Result<KeyRange>>) -> Self {
        Self { reply }
    }

    /// Ticket that is already resolved
    pub fn completed(result: Result<KeyRange>) -> Self {
        let (tx, rx) = channel::bounded(1);
        // Capacity 1 and a live receiver: cannot fail
        let _ = tx.send(result);
        Self { reply: rx }
    }

    /// Block until the batch commits or fails (`None` waits forever)
    pub fn wait(self, timeout: Option<Duration>) -> Result<KeyRange> {
        let received = match timeout {
            Some(timeout) => self.reply.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => StringDbError::Timeout(format!(
                    "batch not acknowledged within {:?}",
                    timeout
                )),
                RecvTimeoutError::Disconnected => writer_gone(),
            }),
            None => self.reply.recv().map_err(|_| writer_gone()),
        };
        received?
    }
}

fn writer_gone() -> StringDbError {
    StringDbError::InsertFailed("store writer stopped before acknowledging batch".into())
}

struct WriteRequest {
    values: Vec<String>,
    reply: Sender<Result<KeyRange>>,
}

/// State shared by every clone of one open store
struct Shared {
    engine: Arc<Engine>,
    /// Canonical store directory (registry key)
    dir: PathBuf,
    closed: AtomicBool,
    /// Set when a newer version superseded this connection: (old, new)
    outdated: Mutex<Option<(u32, u32)>>,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
    requests: Mutex<Option<Sender<WriteRequest>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn version(&self) -> u32 {
        self.engine.schema().version
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_closed() {
            return Ok(());
        }
        match *self.outdated.lock() {
            Some((old, new)) => Err(StringDbError::StoreOutdated { old, new }),
            None => Err(StringDbError::Storage(format!(
                "store {} is closed",
                self.dir.display()
            ))),
        }
    }

    fn notify(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Stop the writer and make everything durable. Idempotent.
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Dropping the last sender ends the writer loop once the queue drains
        self.requests.lock().take();
        if let Some(handle) = self.writer.lock().take() {
            if handle.join().is_err() {
                error!(dir = %self.dir.display(), "store writer panicked");
            }
        }

        if let Err(e) = self.engine.close() {
            error!(dir = %self.dir.display(), error = %e, "failed to close store cleanly");
        }
        debug!(dir = %self.dir.display(), "store closed");
    }

    /// Close because `new` superseded this connection's version
    fn supersede(&self, new: u32) {
        let old = self.version();
        *self.outdated.lock() = Some((old, new));
        self.notify(StoreEvent::VersionChange { old, new });
        warn!(
            dir = %self.dir.display(),
            old,
            new,
            "store outdated, reload required"
        );
        self.shutdown();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type Registry = Mutex<HashMap<PathBuf, Weak<Shared>>>;

/// Stores open in this process, keyed by canonical directory
fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Handle to an open record store
#[derive(Clone)]
pub struct RecordStore {
    shared: Arc<Shared>,
}

impl RecordStore {
    /// Open or create the store described by `config`
    ///
    /// Re-opening an already open store at the same version returns a handle
    /// to the same connection.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let dir = config.store_dir();
        fs::create_dir_all(&dir).map_err(|e| {
            StringDbError::OpenFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let dir = dir.canonicalize().map_err(|e| {
            StringDbError::OpenFailed(format!("cannot resolve {}: {}", dir.display(), e))
        })?;

        let mut registry = registry().lock();
        registry.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = registry.get(&dir).and_then(Weak::upgrade) {
            if !existing.is_closed() {
                let current = existing.version();
                let length = existing.engine.config().string_length;
                if length != config.string_length {
                    return Err(StringDbError::Config(format!(
                        "store {} holds records of length {}, not {}",
                        dir.display(),
                        length,
                        config.string_length
                    )));
                }
                if current == config.schema_version {
                    return Ok(Self { shared: existing });
                }
                if current > config.schema_version {
                    return Err(StringDbError::VersionError {
                        requested: config.schema_version,
                        existing: current,
                    });
                }
                existing.supersede(config.schema_version);
            }
        }

        let engine = Arc::new(Engine::open(config)?);
        let shared = Self::start(engine, dir.clone())?;
        registry.insert(dir, Arc::downgrade(&shared));

        Ok(Self { shared })
    }

    fn start(engine: Arc<Engine>, dir: PathBuf) -> Result<Arc<Shared>> {
        let (tx, rx) = channel::bounded::<WriteRequest>(engine.config().max_in_flight);

        let writer_engine = Arc::clone(&engine);
        let writer = thread::Builder::new()
            .name(format!("stringdb-writer-{}", engine.config().store_name))
            .spawn(move || {
                for request in rx {
                    let result = writer_engine.insert_batch(request.values);
                    if let Err(e) = &result {
                        warn!(error = %e, "batch insert failed");
                    }
                    // Submitter may have given up waiting
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|e| StringDbError::OpenFailed(format!("cannot start writer: {}", e)))?;

        Ok(Arc::new(Shared {
            engine,
            dir,
            closed: AtomicBool::new(false),
            outdated: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            requests: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        }))
    }

    /// Number of records at this instant
    pub fn count(&self) -> Result<u64> {
        self.shared.ensure_open()?;
        Ok(self.shared.engine.count())
    }

    /// Submit `values` as one atomic batch
    ///
    /// Returns once the batch is queued. Blocks while `max_in_flight`
    /// batches are already queued (bounded by the ack timeout).
    pub fn insert_batch(&self, values: Vec<String>) -> Result<BatchTicket> {
        self.shared.ensure_open()?;

        let sender = self
            .shared
            .requests
            .lock()
            .clone()
            .ok_or_else(|| self.shared.ensure_open().err().unwrap_or_else(writer_gone))?;

        let (reply, ticket) = channel::bounded(1);
        let request = WriteRequest { values, reply };

        match self.config().ack_timeout() {
            Some(timeout) => sender.send_timeout(request, timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => StringDbError::Timeout(format!(
                    "store queue full for {:?}",
                    timeout
                )),
                SendTimeoutError::Disconnected(_) => writer_gone(),
            })?,
            None => sender.send(request).map_err(|_| writer_gone())?,
        }

        Ok(BatchTicket::new(ticket))
    }

    /// Submit a batch and wait for it to commit
    pub fn insert_and_wait(&self, values: Vec<String>) -> Result<KeyRange> {
        self.insert_batch(values)?.wait(self.config().ack_timeout())
    }

    /// Receive version-change and close notifications
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = channel::unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Close this connection for every handle sharing it
    pub fn close(&self) {
        if !self.shared.is_closed() {
            self.shared.notify(StoreEvent::Closed);
            self.shared.shutdown();
            info!(dir = %self.shared.dir.display(), "store closed by owner");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Flush buffered records to an SSTable
    pub fn flush(&self) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.engine.flush()
    }

    /// Every record in key order (integrity checks only)
    pub fn records(&self) -> Result<Vec<StringRecord>> {
        self.shared.ensure_open()?;
        self.shared.engine.records()
    }

    pub fn schema(&self) -> &Schema {
        self.shared.engine.schema()
    }

    pub fn config(&self) -> &Config {
        self.shared.engine.config()
    }

    /// Canonical directory of this store
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }
}

/// Check that persistent storage can be used at all
///
/// Creates the data directory and writes a scratch file. Failure means the
/// host offers no usable persistent storage (`CapabilityUnavailable`).
pub fn check_capability(config: &Config) -> Result<()> {
    let unavailable = |e: std::io::Error| {
        StringDbError::CapabilityUnavailable(format!("{}: {}", config.data_dir.display(), e))
    };

    fs::create_dir_all(&config.data_dir).map_err(unavailable)?;
    let scratch = config.data_dir.join(".stringdb-write-check");
    File::create(&scratch).map_err(unavailable)?;
    fs::remove_file(&scratch).map_err(unavailable)?;
    Ok(())
}
