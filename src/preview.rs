//! Display handles for normalized images.
//!
//! A preview handle is the Rust counterpart of a browser object URL: an
//! opaque `blob:` URL that a renderer can resolve to bytes while the handle is
//! alive. Entries are not reclaimed by anything other than the handle itself,
//! so the handle revokes its entry on drop. Each handle carries a fresh v4
//! UUID, so handles from overlapping normalizations never collide and an
//! abandoned call cannot revoke a newer one's preview.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

/// URL scheme prefix for preview handles.
const URL_PREFIX: &str = "blob:pinstar-media/";

#[derive(Debug, Clone)]
struct PreviewEntry {
    bytes: Arc<[u8]>,
    mime: &'static str,
}

type Entries = Mutex<HashMap<Uuid, PreviewEntry>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<Uuid, PreviewEntry>> {
    // A panic while holding the lock cannot leave the map half-updated.
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared registry of live previews. Cheap to clone.
#[derive(Clone, Default)]
pub struct PreviewStore {
    entries: Arc<Entries>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return the handle that owns the entry.
    pub fn create(&self, bytes: Arc<[u8]>, mime: &'static str) -> PreviewHandle {
        let id = Uuid::new_v4();
        lock(&self.entries).insert(id, PreviewEntry { bytes, mime });
        PreviewHandle {
            id,
            url: format!("{URL_PREFIX}{id}"),
            mime,
            store: Arc::downgrade(&self.entries),
        }
    }

    /// Look up the bytes behind a preview URL. `None` once the handle is released.
    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lookup(url).map(|entry| entry.bytes)
    }

    /// MIME type recorded for a preview URL.
    pub fn mime_of(&self, url: &str) -> Option<&'static str> {
        self.lookup(url).map(|entry| entry.mime)
    }

    fn lookup(&self, url: &str) -> Option<PreviewEntry> {
        let id = url
            .strip_prefix(URL_PREFIX)
            .and_then(|s| Uuid::parse_str(s).ok())?;
        lock(&self.entries).get(&id).cloned()
    }

    /// Number of live previews.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PreviewStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewStore")
            .field("live", &self.len())
            .finish()
    }
}

/// Owns one preview entry; revokes it when dropped.
///
/// The handle only holds a weak reference to the store, so a handle that
/// outlives its store is harmless.
pub struct PreviewHandle {
    id: Uuid,
    url: String,
    mime: &'static str,
    store: Weak<Entries>,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Revoke now instead of at end of scope.
    pub fn release(self) {}
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if let Some(entries) = self.store.upgrade() {
            lock(&entries).remove(&self.id);
        }
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("url", &self.url)
            .field("mime", &self.mime)
            .finish()
    }
}
