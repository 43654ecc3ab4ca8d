use super::RecognitionError;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;

/// Build a CPU ONNX Runtime session for the model at `model_path`.
pub fn load_session<P: AsRef<Path>>(model_path: P) -> Result<Session, RecognitionError> {
    let path = model_path.as_ref();
    let load_error = |reason: String| RecognitionError::ModelLoad {
        path: path.display().to_string(),
        reason,
    };

    if !path.is_file() {
        return Err(load_error("file not found".to_string()));
    }

    let session = Session::builder()
        .map_err(|e| load_error(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error(e.to_string()))?
        .commit_from_file(path)
        .map_err(|e| load_error(e.to_string()))?;

    log::info!("Loaded ONNX model: {}", path.display());
    Ok(session)
}

/// Pack an RGB image into a 1×3×H×W float tensor, `f(channel_value)` per sample.
pub fn to_nchw(image: &image::RgbImage, f: impl Fn(u8) -> f32) -> ([usize; 4], Vec<f32>) {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; plane * 3];

    for (i, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = f(pixel[c]);
        }
    }

    ([1, 3, height as usize, width as usize], data)
}
