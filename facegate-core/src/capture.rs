use crate::config::CameraConfig;
use crate::frame::{Frame, FrameSlot, SlotRead};
use image::RgbImage;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture as V4lCapture;
use v4l::FourCC;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("Frame conversion failed: {0}")]
    Conversion(String),
}

/// Pause between grabs after the device reports an error
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Anything that can hand out camera images one at a time.
///
/// A grabber is built and driven on the capture thread, so it does not need
/// to be `Send`.
pub trait FrameGrabber {
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Live frame feed backed by a capture thread.
///
/// The device is acquired once in [`FrameSource::open`] and held until the
/// source is dropped. Only the most recent frame is kept.
pub struct FrameSource {
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Open the V4L2 camera described by `config`.
    pub fn open_camera(config: &CameraConfig) -> Result<Self, CaptureError> {
        let config = config.clone();
        Self::open(move || V4lCamera::open(&config))
    }

    /// Start a capture thread around the grabber produced by `open_device`.
    ///
    /// Blocks until the device is open, so a missing camera surfaces here as
    /// `DeviceUnavailable` rather than on the first frame.
    pub fn open<G, F>(open_device: F) -> Result<Self, CaptureError>
    where
        G: FrameGrabber,
        F: FnOnce() -> Result<G, CaptureError> + Send + 'static,
    {
        let slot = FrameSlot::new();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread_slot = slot.clone();
        let thread_stop = stop.clone();
        let worker = thread::Builder::new()
            .name("facegate-capture".to_string())
            .spawn(move || {
                let mut grabber = match open_device() {
                    Ok(grabber) => {
                        let _ = ready_tx.send(Ok(()));
                        grabber
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_capture_loop(&mut grabber, &thread_slot, &thread_stop);
            })
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("Failed to start capture thread: {}", e))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "Capture thread exited before opening the device".to_string(),
                ))
            }
        }

        log::info!("Frame source started");
        Ok(Self {
            slot,
            stop,
            worker: Some(worker),
        })
    }

    /// Return the most recent frame.
    pub fn next_frame(&self) -> Result<Frame, CaptureError> {
        if self.worker.as_ref().map_or(true, |w| w.is_finished()) {
            return Err(CaptureError::CaptureFailed(
                "Capture thread is no longer running".to_string(),
            ));
        }

        match self.slot.read() {
            SlotRead::Frame(frame) => Ok(frame),
            SlotRead::Failed(reason) => Err(CaptureError::CaptureFailed(reason)),
            SlotRead::Empty => Err(CaptureError::CaptureFailed(
                "No frame captured yet".to_string(),
            )),
        }
    }

    /// Read-only handle on the frame slot.
    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // The thread may be parked inside a device read; let it finish on its own.
        self.worker.take();
        log::debug!("Frame source stopped");
    }
}

fn run_capture_loop<G: FrameGrabber>(grabber: &mut G, slot: &FrameSlot, stop: &AtomicBool) {
    let mut failing = false;

    while !stop.load(Ordering::Relaxed) {
        match grabber.grab() {
            Ok(image) => {
                if failing {
                    log::info!("Camera recovered");
                    failing = false;
                }
                slot.publish(image);
            }
            Err(e) => {
                if !failing {
                    log::warn!("Frame capture failed: {}", e);
                    failing = true;
                } else {
                    log::trace!("Frame capture still failing: {}", e);
                }
                slot.fail(e.to_string());
                thread::sleep(RETRY_DELAY);
            }
        }
    }
}

/// V4L2 webcam negotiated to MJPEG or YUYV.
pub struct V4lCamera {
    // Keeps the device open for the stream's lifetime
    _device: Device,
    stream: MmapStream<'static>,
    width: u32,
    height: u32,
    format: FourCC,
}

impl V4lCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        let device_path = &config.device;

        let device = match device_path.parse::<usize>() {
            Ok(index) => Device::new(index),
            Err(_) => Device::with_path(device_path),
        }
        .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", device_path, e)))?;

        let mut format = device
            .format()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("Failed to get format: {}", e)))?;
        format.width = config.width;
        format.height = config.height;

        // Prefer MJPEG if available, fall back to YUYV
        for fourcc in [FourCC::new(b"MJPG"), FourCC::new(b"YUYV")] {
            format.fourcc = fourcc;
            if device.set_format(&format).is_ok() {
                break;
            }
        }

        let actual = device.format().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("Failed to verify format: {}", e))
        })?;

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, 4).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("Failed to create stream: {}", e))
        })?;

        log::info!(
            "Camera {} initialized: {}x{} {}",
            device_path,
            actual.width,
            actual.height,
            actual.fourcc
        );

        Ok(Self {
            _device: device,
            stream,
            width: actual.width,
            height: actual.height,
            format: actual.fourcc,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Enumerate `/dev/video*` nodes, sorted by path
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let entries = fs::read_dir("/dev")
            .map_err(|e| CaptureError::DeviceUnavailable(format!("Failed to read /dev: {}", e)))?;

        let mut devices: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.starts_with("video"))
            })
            .filter_map(|path| path.to_str().map(str::to_string))
            .collect();

        devices.sort();
        Ok(devices)
    }
}

impl FrameGrabber for V4lCamera {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        match self.format.str() {
            Ok("MJPG") => decode_mjpeg(buf),
            Ok("YUYV") => decode_yuyv(buf, self.width, self.height),
            _ => Err(CaptureError::Conversion(format!(
                "Unsupported pixel format: {}",
                self.format
            ))),
        }
    }
}

fn decode_mjpeg(data: &[u8]) -> Result<RgbImage, CaptureError> {
    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| CaptureError::Conversion(format!("MJPEG decode failed: {}", e)))
}

/// Convert packed YUYV 4:2:2 (Y0 U Y1 V per pixel pair) to RGB.
fn decode_yuyv(data: &[u8], width: u32, height: u32) -> Result<RgbImage, CaptureError> {
    let expected = width as usize * height as usize * 2;
    if data.len() < expected {
        return Err(CaptureError::Conversion(format!(
            "YUYV buffer too small: expected {}, got {}",
            expected,
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for quad in data[..expected].chunks_exact(4) {
        let u = quad[1] as i32 - 128;
        let v = quad[3] as i32 - 128;
        for luma in [quad[0] as i32, quad[2] as i32] {
            rgb.push((luma + ((1436 * v) >> 10)).clamp(0, 255) as u8);
            rgb.push((luma - ((354 * u + 732 * v) >> 10)).clamp(0, 255) as u8);
            rgb.push((luma + ((1814 * u) >> 10)).clamp(0, 255) as u8);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CaptureError::Conversion("Failed to create RGB image".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct ScriptedGrabber {
        remaining_ok: usize,
    }

    impl FrameGrabber for ScriptedGrabber {
        fn grab(&mut self) -> Result<RgbImage, CaptureError> {
            thread::sleep(Duration::from_millis(2));
            if self.remaining_ok == 0 {
                return Err(CaptureError::CaptureFailed("unplugged".to_string()));
            }
            self.remaining_ok -= 1;
            Ok(RgbImage::new(4, 3))
        }
    }

    fn wait_for<T>(mut ready: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(value) = ready() {
                return value;
            }
            assert!(Instant::now() < deadline, "timed out waiting for frame source");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_open_failure_is_device_unavailable() {
        let result = FrameSource::open(|| -> Result<ScriptedGrabber, CaptureError> {
            Err(CaptureError::DeviceUnavailable("no camera".to_string()))
        });
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_next_frame_returns_latest() {
        let source = FrameSource::open(|| Ok(ScriptedGrabber { remaining_ok: usize::MAX })).unwrap();
        let frame = wait_for(|| source.next_frame().ok());
        assert_eq!((frame.width(), frame.height()), (4, 3));

        let later = wait_for(|| {
            source
                .next_frame()
                .ok()
                .filter(|f| f.sequence() > frame.sequence())
        });
        assert!(later.sequence() > frame.sequence());
    }

    #[test]
    fn test_stalled_device_reports_capture_failed() {
        let source = FrameSource::open(|| Ok(ScriptedGrabber { remaining_ok: 1 })).unwrap();
        let err = wait_for(|| match source.next_frame() {
            Err(CaptureError::CaptureFailed(reason)) if reason.contains("unplugged") => Some(reason),
            _ => None,
        });
        assert!(err.contains("unplugged"));
    }

    #[test]
    fn test_decode_yuyv_gray() {
        // Y=128 with neutral chroma is mid gray
        let data = [128u8, 128, 128, 128, 128, 128, 128, 128];
        let img = decode_yuyv(&data, 2, 2).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn test_decode_yuyv_short_buffer() {
        assert!(matches!(
            decode_yuyv(&[0u8; 4], 2, 2),
            Err(CaptureError::Conversion(_))
        ));
    }

    #[test]
    #[ignore] // Requires actual camera hardware
    fn test_camera_capture() {
        let config = CameraConfig {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        };
        let mut camera = V4lCamera::open(&config).expect("Failed to open camera");
        let frame = camera.grab().expect("Failed to capture frame");
        assert_eq!(frame.dimensions(), camera.dimensions());
    }
}
