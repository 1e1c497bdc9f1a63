use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Backend-specific name of a colour texture. Zero is reserved for "nothing published".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(NonZeroU64);

impl TextureId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex{}", self.0)
    }
}

/// Write half of the published texture handle. Owned by the render thread only.
///
/// Stores use `Release` so that a reader that observes an id also observes every GPU
/// submission made before the store.
#[derive(Debug)]
pub struct TexturePublisher {
    slot: Arc<AtomicU64>,
}

impl TexturePublisher {
    pub fn publish(&self, texture: TextureId) {
        self.slot.store(texture.get(), Ordering::Release);
    }

    /// Reset to the unset sentinel.
    pub fn clear(&self) {
        self.slot.store(0, Ordering::Release);
    }

    /// The value this side last stored.
    pub fn current(&self) -> Option<TextureId> {
        TextureId::new(self.slot.load(Ordering::Relaxed))
    }
}

/// Read half of the published texture handle, used by the UI thread when painting.
#[derive(Debug, Clone)]
pub struct TextureReader {
    slot: Arc<AtomicU64>,
}

impl TextureReader {
    pub fn current(&self) -> Option<TextureId> {
        TextureId::new(self.slot.load(Ordering::Acquire))
    }
}

/// Create a connected publisher/reader pair, initially unset.
pub fn texture_slot() -> (TexturePublisher, TextureReader) {
    let slot = Arc::new(AtomicU64::new(0));
    (
        TexturePublisher { slot: slot.clone() },
        TextureReader { slot },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_unset() {
        let (publisher, reader) = texture_slot();
        assert!(reader.current().is_none());
        assert!(publisher.current().is_none());
    }

    #[test]
    fn test_publish_and_clear() {
        let (publisher, reader) = texture_slot();
        let id = TextureId::new(7).unwrap();

        publisher.publish(id);
        assert_eq!(reader.current(), Some(id));
        assert_eq!(reader.clone().current(), Some(id));

        publisher.clear();
        assert!(reader.current().is_none());
    }

    #[test]
    fn test_zero_is_not_a_texture() {
        assert!(TextureId::new(0).is_none());
        assert_eq!(TextureId::new(3).unwrap().get(), 3);
    }

    #[test]
    fn test_reader_sees_publish_from_other_thread() {
        let (publisher, reader) = texture_slot();
        let handle = std::thread::spawn(move || {
            for raw in 1..=100 {
                publisher.publish(TextureId::new(raw).unwrap());
            }
        });
        handle.join().unwrap();
        assert_eq!(reader.current().map(TextureId::get), Some(100));
    }
}
