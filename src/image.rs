//! Local transient image handles.
//!
//! A handle is the in-memory stand-in for an image fetched from the backend.
//! Handles are registered with an [`ImageRegistry`] when created and removed
//! from it when the last clone is dropped, so leaked handles show up as a
//! growing `live_count()`.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

/// Tracks which local image handles are still alive.
#[derive(Clone, Default)]
pub struct ImageRegistry {
    inner: Arc<RegistryInner>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap fetched bytes in a new handle. `source` records where they came
    /// from (a backend path or a request description).
    pub fn acquire(&self, bytes: Vec<u8>, source: impl Into<String>) -> ImageHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.live.lock().unwrap().insert(id);
        let source = source.into();
        debug!(target: "image", id, source = %source, bytes = bytes.len(), "image handle acquired");
        ImageHandle {
            image: Arc::new(LocalImage {
                id,
                source,
                bytes,
                registry: Arc::clone(&self.inner),
            }),
        }
    }

    /// Number of handles not yet released.
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().unwrap().len()
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.inner.live.lock().unwrap().contains(&id)
    }
}

struct LocalImage {
    id: u64,
    source: String,
    bytes: Vec<u8>,
    registry: Arc<RegistryInner>,
}

impl Drop for LocalImage {
    fn drop(&mut self) {
        self.registry.live.lock().unwrap().remove(&self.id);
        debug!(target: "image", id = self.id, "image handle released");
    }
}

/// Shared reference to a local image. Clones share one registry entry.
#[derive(Clone)]
pub struct ImageHandle {
    image: Arc<LocalImage>,
}

impl ImageHandle {
    pub fn id(&self) -> u64 {
        self.image.id
    }

    pub fn source(&self) -> &str {
        &self.image.source
    }

    pub fn bytes(&self) -> &[u8] {
        &self.image.bytes
    }

    pub fn len(&self) -> usize {
        self.image.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.bytes.is_empty()
    }

    /// Best-effort format guess from magic bytes, for display only.
    pub fn format_hint(&self) -> &'static str {
        match self.bytes() {
            [0x89, b'P', b'N', b'G', ..] => "png",
            [0xFF, 0xD8, 0xFF, ..] => "jpeg",
            [b'I', b'I', 42, 0, ..] | [b'M', b'M', 0, 42, ..] => "tiff",
            _ => "binary",
        }
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.image.id == other.image.id
    }
}

impl Eq for ImageHandle {}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("id", &self.image.id)
            .field("source", &self.image.source)
            .field("bytes", &self.image.bytes.len())
            .finish()
    }
}
