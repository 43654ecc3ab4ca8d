use super::scrfd::Landmarks;
use super::RecognitionError;
use image::{Rgb, RgbImage};

/// Side of the aligned face crop fed to the embedder
pub const ALIGNED_SIZE: u32 = 112;

/// ArcFace reference landmark positions in a 112×112 crop
pub const TEMPLATE: Landmarks = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Similarity transform `x' = a·x − b·y + tx`, `y' = b·x + a·y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` points onto `dst`.
    pub fn estimate(src: &Landmarks, dst: &Landmarks) -> Option<Self> {
        let n = src.len() as f32;
        let (mut sx, mut sy, mut su, mut sv) = (0.0, 0.0, 0.0, 0.0);
        let (mut sxx_yy, mut sux_vy, mut svx_uy) = (0.0, 0.0, 0.0);

        for (&(x, y), &(u, v)) in src.iter().zip(dst.iter()) {
            sx += x;
            sy += y;
            su += u;
            sv += v;
            sxx_yy += x * x + y * y;
            sux_vy += u * x + v * y;
            svx_uy += v * x - u * y;
        }

        let denom = n * sxx_yy - sx * sx - sy * sy;
        if denom.abs() < 1e-6 {
            return None;
        }

        let a = (n * sux_vy - su * sx - sv * sy) / denom;
        let b = (n * svx_uy + su * sy - sv * sx) / denom;
        Some(Self {
            a,
            b,
            tx: (su - a * sx + b * sy) / n,
            ty: (sv - b * sx - a * sy) / n,
        })
    }

    /// Map an output pixel back to the source image.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-6 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Warp the face described by `landmarks` into a canonical 112×112 crop.
pub fn align_face(image: &RgbImage, landmarks: &Landmarks) -> Result<RgbImage, RecognitionError> {
    let transform = Similarity::estimate(landmarks, &TEMPLATE)
        .ok_or_else(|| RecognitionError::Alignment("degenerate landmarks".to_string()))?;

    if (transform.a * transform.a + transform.b * transform.b).abs() < 1e-6 {
        return Err(RecognitionError::Alignment("singular transform".to_string()));
    }

    let mut output = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        if let Some((sx, sy)) = transform.invert_point(x as f32, y as f32) {
            *pixel = sample_bilinear(image, sx, sy);
        }
    }
    Ok(output)
}

/// Bilinear sample; black outside the image.
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    if x0 < 0 || y0 < 0 || x0 + 1 >= image.width() as i64 || y0 + 1 >= image.height() as i64 {
        return Rgb([0, 0, 0]);
    }

    let (x0, y0) = (x0 as u32, y0 as u32);
    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x0 + 1, y0);
    let p01 = image.get_pixel(x0, y0 + 1);
    let p11 = image.get_pixel(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
