use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard};

/// One still image pulled from the camera.
///
/// Pixels are shared behind an `Arc`, so handing a frame to the preview and
/// to the recognition worker costs a reference count, not a copy.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Frame::new(image, 0)
    }
}

#[derive(Debug, Default)]
struct SlotState {
    latest: Option<Frame>,
    failure: Option<String>,
    published: u64,
}

/// Single-slot holder for the most recent frame.
///
/// Publishing replaces whatever was there. Readers only ever get clones.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

/// What a reader sees when it looks into the slot.
#[derive(Debug, Clone)]
pub enum SlotRead {
    Frame(Frame),
    Failed(String),
    Empty,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        // A panicking publisher leaves at worst a stale frame behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a freshly grabbed image, dropping the previous frame.
    pub(crate) fn publish(&self, image: RgbImage) -> u64 {
        let mut state = self.state();
        state.published += 1;
        let sequence = state.published;
        state.latest = Some(Frame::new(image, sequence));
        state.failure = None;
        sequence
    }

    /// Record that the device stopped producing frames.
    ///
    /// The stale frame is discarded so consumers do not keep acting on it.
    pub(crate) fn fail(&self, reason: String) {
        let mut state = self.state();
        state.latest = None;
        state.failure = Some(reason);
    }

    pub fn read(&self) -> SlotRead {
        let state = self.state();
        match (&state.latest, &state.failure) {
            (Some(frame), _) => SlotRead::Frame(frame.clone()),
            (None, Some(reason)) => SlotRead::Failed(reason.clone()),
            (None, None) => SlotRead::Empty,
        }
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.state().published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_keeps_only_latest() {
        let slot = FrameSlot::new();
        assert!(matches!(slot.read(), SlotRead::Empty));

        slot.publish(RgbImage::new(2, 2));
        slot.publish(RgbImage::new(4, 4));

        match slot.read() {
            SlotRead::Frame(frame) => {
                assert_eq!(frame.width(), 4);
                assert_eq!(frame.sequence(), 2);
            }
            other => panic!("expected a frame, got {:?}", other),
        }
        assert_eq!(slot.published(), 2);
    }

    #[test]
    fn test_failure_clears_frame_until_next_publish() {
        let slot = FrameSlot::new();
        slot.publish(RgbImage::new(2, 2));
        slot.fail("unplugged".to_string());
        assert!(matches!(slot.read(), SlotRead::Failed(ref r) if r == "unplugged"));

        slot.publish(RgbImage::new(2, 2));
        assert!(matches!(slot.read(), SlotRead::Frame(_)));
    }

    #[test]
    fn test_frame_clone_shares_pixels() {
        let frame = Frame::from(RgbImage::new(8, 8));
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.image(), copy.image()));
    }
}
