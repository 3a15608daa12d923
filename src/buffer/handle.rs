use std::ops::Deref;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::store::{BufferData, BufferEvent, BufferId, BufferStore, SampleGuard};
use crate::error::{AnalysisError, Result};

/// A by-name reference to a buffer living in a [`BufferStore`].
///
/// Resolution is lazy: the name is looked up on the first `acquire` and the
/// result cached until a change notification for that name arrives.
pub struct BufferHandle {
    store: Arc<dyn BufferStore>,
    name: Option<String>,
    resolved: Option<BufferId>,
    events: Receiver<BufferEvent>,
}

impl BufferHandle {
    pub fn new(store: Arc<dyn BufferStore>) -> Self {
        let events = store.subscribe();
        Self {
            store,
            name: None,
            resolved: None,
            events,
        }
    }

    /// Point the handle at `name`, replacing any prior binding.
    pub fn bind(&mut self, name: &str) {
        self.name = Some(name.to_string());
        self.resolved = None;
    }

    pub fn unbind(&mut self) {
        self.name = None;
        self.resolved = None;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Lock the bound buffer for reading. The returned guard unlocks on drop,
    /// so every exit path of the caller releases the buffer.
    pub fn acquire(&mut self) -> Result<BufferLock> {
        self.drain_notifications();

        let name = self.name.clone().ok_or(AnalysisError::NoBufferBound)?;
        let id = match self.resolved {
            Some(id) => id,
            None => {
                let id = self
                    .store
                    .resolve(&name)
                    .ok_or_else(|| AnalysisError::BufferNotFound { name: name.clone() })?;
                self.resolved = Some(id);
                id
            }
        };

        let guard = match self.store.lock(id) {
            Some(guard) => guard,
            None => {
                self.resolved = None;
                return Err(AnalysisError::BufferUnreadable { name });
            }
        };

        log::debug!("Locked buffer '{}'", name);
        Ok(BufferLock {
            store: Arc::clone(&self.store),
            id,
            name,
            guard: Some(guard),
        })
    }

    fn drain_notifications(&mut self) {
        let Some(name) = self.name.as_deref() else {
            while self.events.try_recv().is_ok() {}
            return;
        };
        while let Ok(event) = self.events.try_recv() {
            if event.concerns(name) {
                log::debug!("Buffer '{}' changed ({:?}), re-resolving", name, event);
                self.resolved = None;
            }
        }
    }
}

/// Scoped read lock on a buffer's samples.
pub struct BufferLock {
    store: Arc<dyn BufferStore>,
    id: BufferId,
    name: String,
    guard: Option<SampleGuard>,
}

impl BufferLock {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unlock now instead of at scope end.
    pub fn release(self) {}
}

impl Deref for BufferLock {
    type Target = BufferData;

    fn deref(&self) -> &BufferData {
        // Only `Drop` takes the guard.
        self.guard.as_deref().expect("buffer lock already released")
    }
}

impl Drop for BufferLock {
    fn drop(&mut self) {
        self.guard.take();
        self.store.unlock(self.id);
        log::debug!("Unlocked buffer '{}'", self.name);
    }
}
