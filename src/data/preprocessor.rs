// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns a decoded CAPTCHA image into the model's input format.
//
// Steps (always, train and inference alike):
//   1. Convert to 8-bit grayscale (one channel)
//   2. Resize to the fixed model input size (bilinear)
//   3. Normalise intensities from [0, 255] to [0.0, 1.0]
//
// Training adds a random Augmentation between steps 2 and 3:
//   - affine warp: rotation, translation, scale, shear
//   - brightness jitter
// Pixels uncovered by the warp are filled with black.
//
// Reference: image crate (imageops), imageproc (geometric_transformations)

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use rand::Rng;

/// Fixed-size grayscale conversion and normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    width:  u32,
    height: u32,
}

impl Preprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Grayscale + resize. Images already at the target size are not resampled.
    pub fn prepare(&self, image: &DynamicImage) -> GrayImage {
        let gray = image.to_luma8();
        if gray.dimensions() == (self.width, self.height) {
            return gray;
        }
        image::imageops::resize(&gray, self.width, self.height, FilterType::Triangle)
    }

    /// Row-major pixel intensities in [0, 1], length = width * height
    pub fn to_pixels(&self, image: &GrayImage) -> Vec<f32> {
        image.pixels().map(|p| p[0] as f32 / 255.0).collect()
    }

    /// prepare + to_pixels in one call (the inference path)
    pub fn process(&self, image: &DynamicImage) -> Vec<f32> {
        self.to_pixels(&self.prepare(image))
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(120, 100)
    }
}

/// Random affine + brightness augmentation for training images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Augmentation {
    /// Rotation drawn from [-max_rotation, max_rotation] degrees
    pub max_rotation: f32,
    /// Translation as a fraction of width / height
    pub max_translate: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Horizontal shear drawn from [-max_shear, max_shear] degrees
    pub max_shear: f32,
    /// Brightness factor drawn from [1 - brightness, 1 + brightness]
    pub brightness: f32,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            max_rotation:  15.0,
            max_translate: 0.1,
            min_scale:     0.9,
            max_scale:     1.1,
            max_shear:     5.0,
            brightness:    0.2,
        }
    }
}

impl Augmentation {
    /// An augmentation that leaves images unchanged
    pub fn none() -> Self {
        Self {
            max_rotation:  0.0,
            max_translate: 0.0,
            min_scale:     1.0,
            max_scale:     1.0,
            max_shear:     0.0,
            brightness:    0.0,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: &GrayImage, rng: &mut R) -> GrayImage {
        let (w, h) = image.dimensions();
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);

        let angle = symmetric(rng, self.max_rotation).to_radians();
        let tx    = symmetric(rng, self.max_translate) * w as f32;
        let ty    = symmetric(rng, self.max_translate) * h as f32;
        let scale = rng.gen_range(self.min_scale..=self.max_scale);
        let shear = symmetric(rng, self.max_shear).to_radians().tan();

        // Warp about the image centre, then shift.
        let shear = Projection::from_matrix([1.0, shear, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap_or_else(|| Projection::scale(1.0, 1.0));
        let projection = Projection::translate(cx + tx, cy + ty)
            * Projection::rotate(angle)
            * shear
            * Projection::scale(scale, scale)
            * Projection::translate(-cx, -cy);

        let mut out = warp(image, &projection, Interpolation::Bilinear, Luma([0u8]));

        let factor = 1.0 + symmetric(rng, self.brightness);
        if factor != 1.0 {
            for p in out.pixels_mut() {
                p[0] = (p[0] as f32 * factor).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, max: f32) -> f32 {
    if max <= 0.0 {
        return 0.0;
    }
    rng.gen_range(-max..=max)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::{rngs::StdRng, SeedableRng};

    fn blue_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([3, 108, 223])))
    }

    #[test]
    fn test_prepare_resizes_to_target() {
        let p = Preprocessor::new(120, 100);
        let g = p.prepare(&blue_image(240, 200));
        assert_eq!(g.dimensions(), (120, 100));
    }

    #[test]
    fn test_pixels_are_normalised() {
        let p      = Preprocessor::new(4, 2);
        let pixels = p.process(&blue_image(4, 2));
        assert_eq!(pixels.len(), 8);
        assert!(pixels.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // All pixels share the same gray level
        assert!(pixels.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_white_maps_to_one() {
        let p = Preprocessor::new(2, 2);
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([255])));
        assert_eq!(p.process(&img), vec![1.0; 4]);
    }

    #[test]
    fn test_augmentation_keeps_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let img     = GrayImage::from_pixel(120, 100, Luma([200]));
        let out     = Augmentation::default().apply(&img, &mut rng);
        assert_eq!(out.dimensions(), (120, 100));
    }

    #[test]
    fn test_no_augmentation_preserves_centre() {
        let mut rng = StdRng::seed_from_u64(7);
        let img     = GrayImage::from_pixel(20, 10, Luma([128]));
        let out     = Augmentation::none().apply(&img, &mut rng);
        assert_eq!(out.get_pixel(10, 5)[0], 128);
    }

    #[test]
    fn test_black_stays_black_under_brightness() {
        let mut rng = StdRng::seed_from_u64(1);
        let img     = GrayImage::new(16, 16);
        let aug     = Augmentation { brightness: 0.5, ..Augmentation::none() };
        let out     = aug.apply(&img, &mut rng);
        assert!(out.pixels().all(|p| p[0] == 0));
    }
}
