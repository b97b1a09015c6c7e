use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use cathode_common::types::{Hyperlink, SixelImage};

/// Interner for payloads shared across cells.
///
/// Sharing is `Arc`-based: every cell referencing an object holds one
/// strong count, the emulator's open hyperlink holds one more, and the
/// store itself only keeps weak entries. Dropping the last cell releases
/// the payload deterministically; dead weak entries are swept on the next
/// intern.
#[derive(Debug, Default)]
pub struct TrackedStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    hyperlinks: HashMap<(String, Option<String>), Weak<Hyperlink>>,
    sixels: HashMap<Vec<u8>, Weak<SixelImage>>,
}

impl TrackedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_hyperlink(&self, uri: String, id: Option<String>) -> Arc<Hyperlink> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.hyperlinks.retain(|_, weak| weak.strong_count() > 0);

        let key = (uri.clone(), id.clone());
        if let Some(existing) = inner.hyperlinks.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let link = Arc::new(Hyperlink { uri, id });
        inner.hyperlinks.insert(key, Arc::downgrade(&link));
        link
    }

    pub fn intern_sixel(&self, data: Vec<u8>, width_cells: u16, height_cells: u16) -> Arc<SixelImage> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sixels.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = inner.sixels.get(&data).and_then(Weak::upgrade) {
            return existing;
        }
        let image = Arc::new(SixelImage {
            data: data.clone(),
            width_cells,
            height_cells,
        });
        inner.sixels.insert(data, Arc::downgrade(&image));
        image
    }

    /// Number of payloads still referenced somewhere.
    pub fn live_objects(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.hyperlinks.retain(|_, weak| weak.strong_count() > 0);
        inner.sixels.retain(|_, weak| weak.strong_count() > 0);
        inner.hyperlinks.len() + inner.sixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_by_payload_identity() {
        let store = TrackedStore::new();
        let a = store.intern_hyperlink("https://ex".into(), Some("42".into()));
        let b = store.intern_hyperlink("https://ex".into(), Some("42".into()));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(Arc::strong_count(&a), 2);

        let c = store.intern_hyperlink("https://ex".into(), None);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn release_at_zero_is_deterministic() {
        let store = TrackedStore::new();
        let link = store.intern_hyperlink("https://ex".into(), None);
        assert_eq!(store.live_objects(), 1);
        drop(link);
        assert_eq!(store.live_objects(), 0);

        // A re-intern after release produces a fresh object.
        let again = store.intern_hyperlink("https://ex".into(), None);
        assert_eq!(Arc::strong_count(&again), 1);
    }

    #[test]
    fn sixels_share_by_data() {
        let store = TrackedStore::new();
        let a = store.intern_sixel(b"q#1~~".to_vec(), 3, 2);
        let b = store.intern_sixel(b"q#1~~".to_vec(), 9, 9);
        // Identity wins; the first-seen dimensions stick.
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.width_cells, 3);
    }
}
