use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::lock_api::ArcRwLockReadGuard;
use parking_lot::{Mutex, RawRwLock, RwLock};
use serde::Serialize;

/// Opaque identity of a resolved buffer. Stays stable across content
/// replacement and renames; a removed buffer's id is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

/// Interleaved sample storage plus the metadata the analysis needs.
#[derive(Debug, Clone)]
pub struct BufferData {
    samples: Vec<f32>,
    channel_count: usize,
    sample_rate: u32,
    source: Option<String>,
}

impl BufferData {
    /// `samples` is interleaved; a trailing partial frame is ignored.
    pub fn new(samples: Vec<f32>, channel_count: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channel_count: channel_count.max(1),
            sample_rate: sample_rate.max(1),
            source: None,
        }
    }

    /// Record where the samples came from (shown in per-run diagnostics).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Read access to a locked buffer. Holding it keeps the samples alive even
/// if the store swaps in new content meanwhile.
pub type SampleGuard = ArcRwLockReadGuard<RawRwLock, BufferData>;

/// Change notifications pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    Modified { name: String },
    Renamed { from: String, to: String },
    Removed { name: String },
}

impl BufferEvent {
    /// Whether this event invalidates a resolution made under `name`.
    pub fn concerns(&self, name: &str) -> bool {
        match self {
            BufferEvent::Modified { name: n } | BufferEvent::Removed { name: n } => n == name,
            BufferEvent::Renamed { from, to } => from == name || to == name,
        }
    }
}

/// The host side of buffer sharing: name resolution, locking and change
/// notification.
pub trait BufferStore: Send + Sync {
    fn resolve(&self, name: &str) -> Option<BufferId>;

    /// `None` when the store refuses read access right now.
    fn lock(&self, id: BufferId) -> Option<SampleGuard>;

    /// Bookkeeping counterpart of a successful [`BufferStore::lock`].
    fn unlock(&self, id: BufferId);

    fn subscribe(&self) -> Receiver<BufferEvent>;
}

/// Metadata snapshot of a stored buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferInfo {
    pub name: String,
    pub frame_count: usize,
    pub channel_count: usize,
    pub sample_rate: u32,
    pub source: Option<String>,
}

struct Entry {
    id: BufferId,
    data: Arc<RwLock<BufferData>>,
    readable: bool,
    active_locks: usize,
}

/// In-memory named buffer store.
pub struct BufferRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
    listeners: Mutex<Vec<Sender<BufferEvent>>>,
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Store `data` under `name`. Replacing existing content keeps the id
    /// and notifies subscribers with [`BufferEvent::Modified`].
    pub fn insert(&self, name: &str, data: BufferData) -> BufferId {
        let (id, replaced) = {
            let mut entries = self.entries.lock();
            match entries.get_mut(name) {
                Some(entry) => {
                    // Outstanding guards keep the old content alive.
                    entry.data = Arc::new(RwLock::new(data));
                    (entry.id, true)
                }
                None => {
                    let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
                    entries.insert(
                        name.to_string(),
                        Entry {
                            id,
                            data: Arc::new(RwLock::new(data)),
                            readable: true,
                            active_locks: 0,
                        },
                    );
                    (id, false)
                }
            }
        };

        if replaced {
            self.notify(BufferEvent::Modified {
                name: name.to_string(),
            });
        }
        log::debug!("Buffer '{}' stored (id {:?})", name, id);
        id
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.lock().remove(name).is_some();
        if removed {
            self.notify(BufferEvent::Removed {
                name: name.to_string(),
            });
        }
        removed
    }

    /// Rename a buffer. Fails when `from` is unknown or `to` is taken.
    pub fn rename(&self, from: &str, to: &str) -> bool {
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(to) {
                return false;
            }
            match entries.remove(from) {
                Some(entry) => {
                    entries.insert(to.to_string(), entry);
                }
                None => return false,
            }
        }
        self.notify(BufferEvent::Renamed {
            from: from.to_string(),
            to: to.to_string(),
        });
        true
    }

    /// Allow or refuse read locks on a buffer, e.g. while it is being filled.
    pub fn set_readable(&self, name: &str, readable: bool) -> bool {
        match self.entries.lock().get_mut(name) {
            Some(entry) => {
                entry.readable = readable;
                true
            }
            None => false,
        }
    }

    pub fn info(&self, name: &str) -> Option<BufferInfo> {
        let entries = self.entries.lock();
        let entry = entries.get(name)?;
        let data = entry.data.read();
        Some(BufferInfo {
            name: name.to_string(),
            frame_count: data.frame_count(),
            channel_count: data.channel_count(),
            sample_rate: data.sample_rate(),
            source: data.source().map(str::to_string),
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Locks handed out and not yet returned through `unlock`.
    pub fn active_locks(&self, name: &str) -> usize {
        self.entries
            .lock()
            .get(name)
            .map_or(0, |entry| entry.active_locks)
    }

    fn notify(&self, event: BufferEvent) {
        log::debug!("Buffer notification: {:?}", event);
        self.listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl BufferStore for BufferRegistry {
    fn resolve(&self, name: &str) -> Option<BufferId> {
        self.entries.lock().get(name).map(|entry| entry.id)
    }

    fn lock(&self, id: BufferId) -> Option<SampleGuard> {
        let mut entries = self.entries.lock();
        let entry = entries.values_mut().find(|entry| entry.id == id)?;
        if !entry.readable {
            return None;
        }
        let guard = entry.data.try_read_arc()?;
        entry.active_locks += 1;
        Some(guard)
    }

    fn unlock(&self, id: BufferId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.values_mut().find(|entry| entry.id == id) {
            entry.active_locks = entry.active_locks.saturating_sub(1);
        }
    }

    fn subscribe(&self) -> Receiver<BufferEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }
}
