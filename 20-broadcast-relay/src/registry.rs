//! Shared set of output sinks for every active session.
//!
//! Two locks guard the registry:
//!
//! - `sinks` protects the map itself and is only held long enough to insert,
//!   remove, or copy out a snapshot.
//! - `delivery` serializes whole broadcasts, so every recipient observes
//!   broadcasts in the same order. Deregistration also takes it, which means
//!   that once [`Registry::deregister`] returns no broadcast will touch that
//!   sink again.
//!
//! Writes happen inline on the broadcasting task. A peer that stops reading
//! can stall a broadcast until its socket errors; there is no per-write
//! timeout.

use std::{
    collections::HashMap,
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{io::AsyncWrite, sync::Mutex};
use tracing::warn;

use crate::protocol::write_line;

/// Opaque, process-unique handle for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writable side of a connection, shared by its session and by broadcasters.
#[derive(Clone)]
pub struct Sink {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl Sink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub async fn send_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_line(&mut *writer, line).await
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

/// Outcome of one broadcast across the snapshot it was delivered to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    sinks: Mutex<HashMap<SessionId, Sink>>,
    delivery: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `sink` under `id`. Returns `false` and keeps the existing sink if
    /// `id` is already registered.
    pub async fn register(&self, id: SessionId, sink: Sink) -> bool {
        let mut sinks = self.sinks.lock().await;
        if sinks.contains_key(&id) {
            return false;
        }
        sinks.insert(id, sink);
        true
    }

    /// Removes the sink for `id`, if any. Safe to call for sessions that never
    /// registered.
    pub async fn deregister(&self, id: SessionId) -> bool {
        let _turn = self.delivery.lock().await;
        self.sinks.lock().await.remove(&id).is_some()
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sinks.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.sinks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sinks.lock().await.is_empty()
    }

    /// Writes `line` to every sink registered when the broadcast starts.
    ///
    /// A failing sink is logged and skipped; it stays registered until its own
    /// session tears down.
    pub async fn broadcast(&self, line: &str) -> Delivery {
        let _turn = self.delivery.lock().await;
        let snapshot: Vec<(SessionId, Sink)> = {
            let sinks = self.sinks.lock().await;
            sinks.iter().map(|(id, sink)| (*id, sink.clone())).collect()
        };

        let mut outcome = Delivery::default();
        for (id, sink) in snapshot {
            match sink.send_line(line).await {
                Ok(()) => outcome.delivered += 1,
                Err(error) => {
                    warn!(session = %id, ?error, "failed to deliver line");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
