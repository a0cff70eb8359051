// ============================================================
// Layer 4 — Synthetic CAPTCHA Generator
// ============================================================
// Renders labelled CAPTCHA images that look like the target
// site's challenges: white glyphs on a solid blue background.
//
// Rendering one image (all sizes below are ×scale):
//   1. Pick `chars_per_image` random alphabet symbols
//   2. Rasterise each glyph on its own transparent canvas at a
//      random font size, then rotate it by a random angle,
//      growing the canvas so no corner is clipped
//   3. Lay the glyphs left to right on a background canvas
//      three times the target size; neighbours are separated by
//      a random gap in [-max_overlap, max_gap], so negative gaps
//      make letters overlap (controlled kerning)
//   4. Crop a centred window of the target size plus a margin
//      that absorbs rotation growth
//   5. Downsample to the target size with Lanczos to remove
//      aliasing from the supersampled canvas
//
// Reference: ab_glyph (glyph outlines), imageproc (rotation),
//            image crate (compositing, crop, resize)

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{anyhow, bail, Context, Result};
use image::{imageops, imageops::FilterType, DynamicImage, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};
#[cfg(test)]
use std::path::PathBuf;

use crate::domain::vocabulary::Vocabulary;

/// Visual parameters of a generated CAPTCHA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaStyle {
    pub width:           u32,
    pub height:          u32,
    pub background:      [u8; 3],
    pub foreground:      [u8; 3],
    pub chars_per_image: usize,
    /// Inclusive font size range in pixels (before supersampling)
    pub font_size:       (u32, u32),
    /// Inclusive rotation range in degrees
    pub rotation:        (i32, i32),
    /// Largest overlap between neighbouring glyphs, in pixels
    pub max_overlap:     i64,
    /// Largest positive gap between neighbouring glyphs, in pixels
    pub max_gap:         i64,
    /// Supersampling factor
    pub scale:           u32,
}

impl Default for CaptchaStyle {
    fn default() -> Self {
        Self {
            width:           120,
            height:          100,
            background:      [0x03, 0x6C, 0xDF],
            foreground:      [0xFF, 0xFF, 0xFF],
            chars_per_image: 4,
            font_size:       (56, 66),
            rotation:        (-8, 8),
            max_overlap:     11,
            max_gap:         4,
            scale:           2,
        }
    }
}

impl CaptchaStyle {
    /// Extra border (supersampled pixels) kept around the crop window
    /// so rotated glyphs near the edge survive the crop.
    pub fn crop_margin(&self) -> u32 {
        let max_angle = self.rotation.0.abs().max(self.rotation.1.abs()) as f32;
        let max_font  = (self.font_size.1 * self.scale) as f32;
        (max_font * max_angle.to_radians().sin()) as u32 + 2
    }
}

/// Parse `#RRGGBB` (leading `#` optional) into RGB bytes
pub fn parse_hex_color(s: &str) -> Result<[u8; 3]> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid colour '{s}', expected #RRGGBB");
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| anyhow!("{e}"));
    Ok([byte(0)?, byte(2)?, byte(4)?])
}

/// Canvas size that holds a `w × h` image rotated by `theta` radians
pub fn expanded_size(w: u32, h: u32, theta: f32) -> (u32, u32) {
    let (sin, cos) = theta.sin_cos();
    let (w, h)     = (w as f32, h as f32);
    let nw = (w * cos.abs() + h * sin.abs() - 1e-3).ceil().max(1.0);
    let nh = (w * sin.abs() + h * cos.abs() - 1e-3).ceil().max(1.0);
    (nw as u32, nh as u32)
}

/// Rotate by `degrees`, growing the canvas to fit the result
pub fn rotate_expand(img: &RgbaImage, degrees: f32) -> RgbaImage {
    if degrees == 0.0 {
        return img.clone();
    }
    let theta    = degrees.to_radians();
    let (nw, nh) = expanded_size(img.width(), img.height(), theta);

    let mut canvas = RgbaImage::new(nw, nh);
    let x = (nw as i64 - img.width() as i64) / 2;
    let y = (nh as i64 - img.height() as i64) / 2;
    imageops::replace(&mut canvas, img, x, y);

    rotate_about_center(&canvas, theta, Interpolation::Bicubic, Rgba([0, 0, 0, 0]))
}

pub struct CaptchaGenerator {
    font:  FontVec,
    style: CaptchaStyle,
    vocab: Arc<Vocabulary>,
}

impl CaptchaGenerator {
    /// Load the TrueType/OpenType font. A missing font is fatal.
    pub fn from_font_file(path: &Path, style: CaptchaStyle, vocab: Arc<Vocabulary>) -> Result<Self> {
        if !path.is_file() {
            bail!("Font file '{}' not found", path.display());
        }
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read font '{}'", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("Invalid font '{}': {e}", path.display()))?;

        Ok(Self { font, style, vocab })
    }

    pub fn style(&self) -> &CaptchaStyle {
        &self.style
    }

    pub fn random_text<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        random_text(&self.vocab, self.style.chars_per_image, rng)
    }

    /// Render a fresh random CAPTCHA and return it with its label
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> (String, RgbImage) {
        let text  = self.random_text(rng);
        let image = self.compose(&text, rng);
        (text, image)
    }

    /// Rasterise one glyph, cropped to its outline bounds
    fn render_glyph(&self, c: char, px: f32) -> RgbaImage {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let glyph  = scaled.scaled_glyph(c);

        let Some(outlined) = self.font.outline_glyph(glyph) else {
            return RgbaImage::new(1, 1);
        };

        let bounds = outlined.px_bounds();
        let w = bounds.width().ceil().max(1.0) as u32;
        let h = bounds.height().ceil().max(1.0) as u32;
        let [r, g, b] = self.style.foreground;

        let mut img = RgbaImage::new(w, h);
        outlined.draw(|x, y, coverage| {
            if x < w && y < h {
                let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                img.put_pixel(x, y, Rgba([r, g, b, alpha]));
            }
        });
        img
    }

    pub fn compose<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> RgbImage {
        let style = &self.style;
        let s     = style.scale;
        let (w_img, h_img) = (style.width * s, style.height * s);

        let glyphs: Vec<RgbaImage> = text
            .chars()
            .map(|c| {
                let px    = rng.gen_range(style.font_size.0..=style.font_size.1) * s;
                let angle = rng.gen_range(style.rotation.0..=style.rotation.1) as f32;
                rotate_expand(&self.render_glyph(c, px as f32), angle)
            })
            .collect();

        let s64  = s as i64;
        let gaps: Vec<i64> = (0..glyphs.len().saturating_sub(1))
            .map(|_| rng.gen_range(-style.max_overlap * s64..=style.max_gap * s64))
            .collect();

        let total_w: i64 = glyphs.iter().map(|g| g.width() as i64).sum::<i64>() + gaps.iter().sum::<i64>();
        let max_h        = glyphs.iter().map(|g| g.height()).max().unwrap_or(0) as i64;

        let (big_w, big_h) = (w_img * 3, h_img * 3);
        let [r, g, b]      = style.background;
        let mut big        = RgbaImage::from_pixel(big_w, big_h, Rgba([r, g, b, 255]));

        let mut x   = (big_w as i64 - total_w) / 2;
        let start_y = (big_h as i64 - max_h) / 2;
        for (i, glyph) in glyphs.iter().enumerate() {
            imageops::overlay(&mut big, glyph, x, start_y);
            x += glyph.width() as i64 + gaps.get(i).copied().unwrap_or(0);
        }

        let margin = style.crop_margin();
        let cx0    = ((big_w - w_img) / 2).saturating_sub(margin);
        let cy0    = ((big_h - h_img) / 2).saturating_sub(margin);
        let crop   = imageops::crop_imm(&big, cx0, cy0, w_img + 2 * margin, h_img + 2 * margin).to_image();

        let small = imageops::resize(&crop, style.width, style.height, FilterType::Lanczos3);
        DynamicImage::ImageRgba8(small).to_rgb8()
    }
}

/// `len` symbols drawn uniformly from the vocabulary's alphabet
pub fn random_text<R: Rng + ?Sized>(vocab: &Vocabulary, len: usize, rng: &mut R) -> String {
    let symbols = vocab.symbols();
    (0..len).map(|_| symbols[rng.gen_range(0..symbols.len())]).collect()
}

/// First common system font found on this machine, if any
#[cfg(test)]
pub(crate) fn system_font() -> Option<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.is_file())
}
