#![allow(dead_code)]

use facegate_core::recognition::normalize;
use facegate_core::{
    cosine_similarity, Embedding, Gatekeeper, MatchLog, RecognitionError, Recognizer,
    ReferenceGallery,
};
use image::{Rgb, RgbImage};
use ndarray::Array1;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Treats the mean colour of an image as its "face"; all-black images have none.
pub struct ColourRecognizer {
    pub threshold: f32,
    pub embed_calls: Arc<AtomicUsize>,
    /// Images whose top-left pixel has this colour fail to embed
    pub broken_colour: Option<[u8; 3]>,
    /// Raise the flag once this many embeddings have been computed
    pub cancel_after: Option<(usize, Arc<AtomicBool>)>,
    /// Time spent on every embedding
    pub delay: Duration,
}

impl ColourRecognizer {
    pub fn new() -> Self {
        Self {
            threshold: 0.99,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            broken_colour: None,
            cancel_after: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_on(mut self, rgb: [u8; 3]) -> Self {
        self.broken_colour = Some(rgb);
        self
    }

    pub fn cancelling_after(mut self, calls: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((calls, flag));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Recognizer for ColourRecognizer {
    fn embed(&mut self, image: &RgbImage) -> Result<Option<Embedding>, RecognitionError> {
        let calls = self.embed_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, flag)) = &self.cancel_after {
            if calls >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if let Some(broken) = self.broken_colour {
            if image.width() > 0 && image.get_pixel(0, 0).0 == broken {
                return Err(RecognitionError::Alignment("degenerate landmarks".to_string()));
            }
        }

        let mut sums = [0f32; 3];
        for pixel in image.pixels() {
            for (sum, &v) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += v as f32;
            }
        }
        if sums.iter().all(|&s| s == 0.0) {
            return Ok(None);
        }
        Ok(Some(normalize(Array1::from_vec(sums.to_vec()))))
    }

    fn similarity(&self, a: &Embedding, b: &Embedding) -> f32 {
        cosine_similarity(a, b)
    }

    fn is_same_identity(&self, a: &Embedding, b: &Embedding) -> bool {
        self.similarity(a, b) >= self.threshold
    }
}

pub fn solid(rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb(rgb))
}

pub const ALICE: [u8; 3] = [200, 30, 30];
pub const BOB: [u8; 3] = [30, 200, 30];
pub const NOBODY: [u8; 3] = [30, 30, 200];
pub const BLACK: [u8; 3] = [0, 0, 0];

pub struct Fixture {
    pub dir: TempDir,
    pub gatekeeper: Gatekeeper,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let gatekeeper = Gatekeeper::new(
            ReferenceGallery::new(dir.path().join("db"), "png"),
            MatchLog::new(dir.path().join("log.txt")),
        );
        Self { dir, gatekeeper }
    }

    pub fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.gatekeeper.match_log().path())
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
