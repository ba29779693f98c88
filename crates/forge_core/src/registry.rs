//! Registry of running exchanges.
//!
//! Each running exchange owns one entry holding its cancellation token and
//! the sending half of its progress channel. Reconnecting a listener swaps
//! the channel: the previous receiver sees its stream end and the new one
//! receives every subsequent event.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::events::ProgressEvent;
use crate::exchange::ExchangeId;

type SharedSender = Arc<Mutex<Option<UnboundedSender<ProgressEvent>>>>;

/// Emits progress events to whichever listener is currently attached.
#[derive(Clone, Default)]
pub struct ProgressSink {
    sender: SharedSender,
}

impl ProgressSink {
    /// A sink with no listener; events are dropped until one attaches.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let mut sender = self.sender.lock();
        if let Some(tx) = sender.as_ref() {
            if tx.send(event).is_err() {
                // Listener went away; wait for a reconnect.
                *sender = None;
            }
        }
    }

    fn attach(&self) -> UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = unbounded_channel();
        *self.sender.lock() = Some(tx);
        rx
    }
}

struct Entry {
    cancel: CancellationToken,
    sink: ProgressSink,
}

/// Registry keyed by exchange id. At most one task runs per exchange.
#[derive(Default)]
pub struct ExchangeRegistry {
    entries: RwLock<HashMap<ExchangeId, Entry>>,
}

impl ExchangeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a running exchange. The entry is removed when the handle drops.
    pub fn register(self: &Arc<Self>, id: impl Into<ExchangeId>) -> CoreResult<RunHandle> {
        let id = id.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(CoreError::AlreadyRunning(id));
        }

        let cancel = CancellationToken::new();
        let sink = ProgressSink::default();
        entries.insert(
            id.clone(),
            Entry {
                cancel: cancel.clone(),
                sink: sink.clone(),
            },
        );
        debug!("Registered exchange {}", id);

        Ok(RunHandle {
            id,
            cancel,
            sink,
            registry: Arc::clone(self),
        })
    }

    /// Attach a new listener to a running exchange, replacing the previous one.
    pub fn attach(&self, id: &str) -> Option<UnboundedReceiver<ProgressEvent>> {
        self.entries.read().get(id).map(|e| e.sink.attach())
    }

    /// Request cooperative cancellation. Returns false if the exchange is not running.
    pub fn cancel(&self, id: &str) -> bool {
        match self.entries.read().get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn running_ids(&self) -> Vec<ExchangeId> {
        self.entries.read().keys().cloned().collect()
    }

    fn remove(&self, id: &str) {
        self.entries.write().remove(id);
        debug!("Deregistered exchange {}", id);
    }
}

/// Ownership of a registry entry for the task processing one exchange.
pub struct RunHandle {
    id: ExchangeId,
    cancel: CancellationToken,
    sink: ProgressSink,
    registry: Arc<ExchangeRegistry>,
}

impl RunHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn sink(&self) -> &ProgressSink {
        &self.sink
    }

    /// Fail with `ExchangeCancelled` once cancellation was requested.
    pub fn checkpoint(&self) -> CoreResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::ExchangeCancelled(self.id.clone()));
        }
        Ok(())
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
