//! Glyph canonicalization: any size crop in, fixed size classifier input out.
//!
//! The crop is scaled uniformly so its longer side covers a fixed share of the
//! canvas (the share the classifier saw in training), then pasted at the
//! centre of a square canvas of the training background colour. Resizing
//! averages areas; the optional binarization steps decide whether grey levels
//! survive.

use image::{ GrayImage, Luma, imageops };
use imageproc::{ distance_transform::Norm, morphology };
use serde::{ Deserialize, Serialize };

use std::path::Path;

use crate::config::{ Background, Binarization, CanonicalizerConfig, StrokeAdjust };
use crate::error::{ LprError, Result };
use crate::utils;

/// Byte layout handed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelEncoding {
    /// 0..=255 as is, the receiver normalises
    Raw,
    /// `(p / 127.5 - 1) * 127` as signed bytes, the quantised model's input range
    Int8Centered,
}

impl Default for PixelEncoding {
    fn default() -> Self {
        PixelEncoding::Raw
    }
}

/// Square single channel glyph ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    pixels: GrayImage,
}

impl GlyphBitmap {

    pub fn size(&self) -> u32 {
        self.pixels.width()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    /// Row-major pixels, one byte each.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn encode(&self, encoding: PixelEncoding) -> Vec<u8> {
        match encoding {
            PixelEncoding::Raw => self.as_bytes().to_vec(),
            PixelEncoding::Int8Centered => self.as_bytes().iter().map(|&p| {
                let centered = p as f32 / 127.5 - 1.0;
                (centered * 127.0) as i8 as u8
            }).collect(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.pixels.save(path)?;
        Ok(())
    }
}

pub struct Canonicalizer {
    config: CanonicalizerConfig,
}

impl Canonicalizer {

    pub fn new(config: CanonicalizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CanonicalizerConfig {
        &self.config
    }

    /// Letterbox `glyph` into the configured square canvas.
    ///
    /// Ink is expected darker than its surroundings. On a black canvas the
    /// glyph is inverted so the ink comes out light.
    pub fn canonicalize(&self, glyph: &GrayImage) -> Result<GlyphBitmap> {
        let config = &self.config;
        let (width, height) = glyph.dimensions();
        if width == 0 || height == 0 {
            return Err(LprError::empty_glyph(width, height));
        }

        let mut source = match config.binarization {
            Binarization::PrePost { .. } => binarize_otsu(glyph),
            _ => glyph.clone(),
        };
        if let Some(stroke) = config.stroke {
            source = adjust_stroke(&source, stroke);
        }

        let (new_width, new_height) = self.scaled_size(width, height);
        let mut resized = utils::resize_area(&source, new_width, new_height);
        match config.binarization {
            Binarization::Threshold { cut } | Binarization::PrePost { cut } => hard_cut(&mut resized, cut),
            Binarization::Passthrough => {}
        }
        if config.background == Background::Black {
            imageops::invert(&mut resized);
        }

        let size = config.size;
        let mut canvas = GrayImage::from_pixel(size, size, Luma([config.background.value()]));
        let x_offset = (size - new_width) / 2;
        let y_offset = (size - new_height) / 2;
        imageops::replace(&mut canvas, &resized, x_offset as i64, y_offset as i64);
        Ok(GlyphBitmap { pixels: canvas })
    }

    /// Glyph dimensions on the canvas: the longer side becomes
    /// `occupied_fraction * size`, the other follows the aspect ratio.
    pub fn scaled_size(&self, width: u32, height: u32) -> (u32, u32) {
        let config = &self.config;
        let mut scale = config.target_extent() / width.max(height) as f64;
        if !config.upscale {
            scale = scale.min(1.0);
        }
        let fit = |side: u32| ((side as f64 * scale).round() as u32).max(1).min(config.size);
        (fit(width), fit(height))
    }
}

// ink (dark) to 0, paper to 255; flat crops are left alone
fn binarize_otsu(glyph: &GrayImage) -> GrayImage {
    match utils::otsu_split(glyph) {
        Some(level) => {
            let mut out = glyph.clone();
            hard_cut(&mut out, level);
            out
        }
        None => glyph.clone(),
    }
}

fn hard_cut(img: &mut GrayImage, cut: u8) {
    img.pixels_mut().for_each(|p| {
        p.0[0] = if p.0[0] > cut { 255 } else { 0 };
    });
}

// ink is dark here, so thickening it shrinks the light region
fn adjust_stroke(img: &GrayImage, stroke: StrokeAdjust) -> GrayImage {
    match stroke {
        StrokeAdjust::Thicken(k) => morphology::erode(img, Norm::LInf, k),
        StrokeAdjust::Thin(k) => morphology::dilate(img, Norm::LInf, k),
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn grayscale(fraction: f64) -> Canonicalizer {
        Canonicalizer::new(CanonicalizerConfig {
            size: 64,
            occupied_fraction: fraction,
            background: Background::White,
            binarization: Binarization::Passthrough,
            stroke: None,
            upscale: true,
            crop_margin: 0,
        }).unwrap()
    }

    /// Bounds of every pixel that differs from `background`, as (x0, y0, x1, y1) inclusive.
    fn content_bounds(img: &GrayImage, background: u8) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in img.enumerate_pixels() {
            if p.0[0] != background {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        bounds
    }

    fn assert_centered(img: &GrayImage, background: u8) {
        let (x0, y0, x1, y1) = content_bounds(img, background).expect("glyph has content");
        let size = img.width() as i64;
        let left = x0 as i64;
        let right = size - 1 - x1 as i64;
        let top = y0 as i64;
        let bottom = size - 1 - y1 as i64;
        assert!((left - right).abs() <= 1, "left {} right {}", left, right);
        assert!((top - bottom).abs() <= 1, "top {} bottom {}", top, bottom);
    }

    #[test]
    fn empty_glyph_is_an_error() {
        let canon = Canonicalizer::new(CanonicalizerConfig::default()).unwrap();
        for (w, h) in vec![(0, 10), (10, 0), (0, 0)] {
            let err = canon.canonicalize(&GrayImage::new(w, h)).unwrap_err();
            assert_eq!(err.to_string(), format!("empty glyph: {}x{} source", w, h));
        }
    }

    #[test]
    fn tall_glyph_scaled_and_centered() {
        let canon = grayscale(0.75);
        let glyph = GrayImage::from_pixel(40, 120, Luma([0]));
        let out = canon.canonicalize(&glyph).unwrap();
        assert_eq!(out.size(), 64);
        assert_eq!(out.as_bytes().len(), 64 * 64);
        // 120 -> 48, 40 -> 16, offsets (24, 8)
        assert_eq!(content_bounds(out.as_gray(), 255), Some((24, 8, 39, 55)));
        assert_centered(out.as_gray(), 255);
    }

    #[test]
    fn wide_glyph_uses_width_as_longer_side() {
        let canon = grayscale(52.0 / 64.0);
        let glyph = GrayImage::from_pixel(100, 30, Luma([10]));
        let out = canon.canonicalize(&glyph).unwrap();
        assert_eq!(canon.scaled_size(100, 30), (52, 16));
        assert_eq!(content_bounds(out.as_gray(), 255), Some((6, 24, 57, 39)));
    }

    #[test]
    fn many_shapes_stay_centered() {
        let canon = grayscale(0.75);
        for (w, h) in vec![(1, 1), (1, 7), (9, 2), (33, 80), (200, 13), (64, 64), (3, 500)] {
            let out = canon.canonicalize(&GrayImage::from_pixel(w, h, Luma([0]))).unwrap();
            assert_eq!(out.as_gray().dimensions(), (64, 64));
            assert_centered(out.as_gray(), 255);
        }
    }

    #[test]
    fn single_pixel_without_upscale() {
        let mut config = CanonicalizerConfig::default();
        config.binarization = Binarization::Passthrough;
        config.stroke = None;
        config.upscale = false;
        let canon = Canonicalizer::new(config).unwrap();
        let out = canon.canonicalize(&GrayImage::from_pixel(1, 1, Luma([0]))).unwrap();
        assert_eq!(content_bounds(out.as_gray(), 255), Some((31, 31, 31, 31)));
    }

    #[test]
    fn single_pixel_with_upscale_fills_target() {
        let canon = grayscale(0.75);
        let out = canon.canonicalize(&GrayImage::from_pixel(1, 1, Luma([0]))).unwrap();
        assert_eq!(content_bounds(out.as_gray(), 255), Some((8, 8, 55, 55)));
    }

    #[test]
    fn recanonicalizing_content_is_stable() {
        // longer side already equals 0.75 * 64, so nothing is rescaled
        let canon = grayscale(0.75);
        let mut glyph = GrayImage::from_pixel(30, 48, Luma([230]));
        draw_filled_rect_mut(&mut glyph, Rect::at(5, 4).of_size(8, 40), Luma([20]));
        draw_filled_rect_mut(&mut glyph, Rect::at(13, 4).of_size(12, 6), Luma([90]));
        let first = canon.canonicalize(&glyph).unwrap();
        let crop = imageops::crop_imm(first.as_gray(), 17, 8, 30, 48).to_image();
        assert_eq!(crop, glyph);
        let second = canon.canonicalize(&crop).unwrap();
        assert_eq!(first, second);
    }

    fn assert_stable(config: CanonicalizerConfig) {
        let canon = Canonicalizer::new(config).unwrap();
        let mut glyph = GrayImage::from_pixel(30, 48, Luma([255]));
        draw_filled_rect_mut(&mut glyph, Rect::at(5, 4).of_size(8, 40), Luma([0]));
        draw_filled_rect_mut(&mut glyph, Rect::at(13, 4).of_size(12, 6), Luma([0]));
        let first = canon.canonicalize(&glyph).unwrap();
        let crop = imageops::crop_imm(first.as_gray(), 17, 8, 30, 48).to_image();
        assert_eq!(crop, glyph);
        assert_eq!(canon.canonicalize(&crop).unwrap(), first);
    }

    #[test]
    fn recanonicalizing_binary_content_is_stable() {
        let mut config = CanonicalizerConfig::default();
        config.stroke = None;
        assert_stable(config.clone());
        config.binarization = Binarization::Threshold { cut: 128 };
        assert_stable(config);
    }

    #[test]
    fn stroke_pass_is_not_idempotent() {
        let canon = Canonicalizer::new(CanonicalizerConfig::default()).unwrap();
        let mut glyph = GrayImage::from_pixel(30, 48, Luma([255]));
        draw_filled_rect_mut(&mut glyph, Rect::at(5, 4).of_size(8, 40), Luma([0]));
        let ink = |g: &GlyphBitmap| g.as_bytes().iter().filter(|&&p| p == 0).count();
        let first = canon.canonicalize(&glyph).unwrap();
        let crop = imageops::crop_imm(first.as_gray(), 17, 8, 30, 48).to_image();
        let second = canon.canonicalize(&crop).unwrap();
        assert!(ink(&second) > ink(&first));
    }

    #[test]
    fn threshold_policy_outputs_pure_black_and_white() {
        let mut config = CanonicalizerConfig::default();
        config.binarization = Binarization::Threshold { cut: 128 };
        config.stroke = None;
        let canon = Canonicalizer::new(config).unwrap();
        let glyph = GrayImage::from_fn(37, 91, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let out = canon.canonicalize(&glyph).unwrap();
        assert!(out.as_bytes().iter().all(|&p| p == 0 || p == 255));
    }

    #[test]
    fn pre_post_binarization_thickens_strokes() {
        let mut glyph = GrayImage::from_pixel(48, 48, Luma([200]));
        draw_filled_rect_mut(&mut glyph, Rect::at(20, 4).of_size(2, 40), Luma([40]));

        let mut config = CanonicalizerConfig::default();
        config.stroke = None;
        let plain = Canonicalizer::new(config.clone()).unwrap().canonicalize(&glyph).unwrap();
        config.stroke = Some(StrokeAdjust::Thicken(1));
        let thick = Canonicalizer::new(config).unwrap().canonicalize(&glyph).unwrap();

        let ink = |g: &GlyphBitmap| g.as_bytes().iter().filter(|&&p| p == 0).count();
        assert!(plain.as_bytes().iter().all(|&p| p == 0 || p == 255));
        assert!(thick.as_bytes().iter().all(|&p| p == 0 || p == 255));
        assert_eq!(ink(&plain), 2 * 40);
        assert_eq!(ink(&thick), 4 * 42);
    }

    #[test]
    fn black_background_inverts_ink() {
        let mut config = CanonicalizerConfig::default();
        config.background = Background::Black;
        config.stroke = None;
        let canon = Canonicalizer::new(config).unwrap();
        let out = canon.canonicalize(&GrayImage::from_pixel(20, 60, Luma([0]))).unwrap();
        assert_eq!(out.as_gray().get_pixel(0, 0).0[0], 0);
        assert_eq!(out.as_gray().get_pixel(32, 32).0[0], 255);
        assert_centered(out.as_gray(), 0);
    }

    #[test]
    fn int8_encoding() {
        let canon = grayscale(0.75);
        let out = canon.canonicalize(&GrayImage::from_pixel(10, 10, Luma([0]))).unwrap();
        let bytes = out.encode(PixelEncoding::Int8Centered);
        assert_eq!(bytes.len(), 4096);
        assert_eq!(bytes[0] as i8, 127);
        assert_eq!(bytes[32 * 64 + 32] as i8, -127);
        assert_eq!(out.encode(PixelEncoding::Raw), out.as_bytes());
    }
}
