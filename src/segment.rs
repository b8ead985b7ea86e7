//! Glyph segmentation: plate image in, left-to-right character boxes out.
//!
//! The plate is optionally resized to a standard width so the size filters
//! mean the same thing for every capture, binarized with ink as foreground,
//! and split into outer contours. Each contour's bounding rectangle is gated
//! by height, width, area and aspect ratio; survivors are ordered by their
//! left edge and capped to the plate length.

use image::{ DynamicImage, GenericImageView, GrayImage, Luma, imageops::{ self, FilterType } };
use imageproc::{ contours::{ self, BorderType }, filter };
use log::debug;

use std::path::Path;

use crate::config::{ AdaptiveMethod, SegmenterConfig, ThresholdPolicy };
use crate::error::Result;
use crate::utils;

const FOREGROUND: u8 = 255;
const BACKGROUND: u8 = 0;

/// Grayscale plate crop.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateImage {
    gray: GrayImage,
}

impl PlateImage {

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from_dynamic(&img))
    }

    pub fn from_dynamic(img: &DynamicImage) -> Self {
        Self { gray: img.to_luma8() }
    }

    pub fn from_gray(gray: GrayImage) -> Self {
        Self { gray }
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    /// Copy of the pixels under `bbox`, grown by `margin` on every side and
    /// clamped to the image.
    pub fn crop(&self, bbox: &BoundingBox, margin: u32) -> GrayImage {
        let b = bbox.expand(margin, self.width(), self.height());
        self.gray.view(b.x, b.y, b.width, b.height).to_image()
    }

    /// Resize to `width`, keeping the aspect ratio.
    pub fn resize_to_width(&self, width: u32) -> Self {
        if width == self.width() || self.width() == 0 {
            return self.clone();
        }
        let ratio = width as f64 / self.width() as f64;
        let height = ((self.height() as f64 * ratio) as u32).max(1);
        Self { gray: imageops::resize(&self.gray, width, height, FilterType::Triangle) }
    }
}

/// Axis aligned rectangle in plate coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {

    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Grow by `margin` on every side without leaving a `width` x `height` image.
    pub fn expand(&self, margin: u32, width: u32, height: u32) -> Self {
        let x = self.x.saturating_sub(margin).min(width);
        let y = self.y.saturating_sub(margin).min(height);
        let right = self.right().saturating_add(margin).min(width);
        let bottom = self.bottom().saturating_add(margin).min(height);
        Self { x, y, width: right.saturating_sub(x), height: bottom.saturating_sub(y) }
    }

    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self { x, y, width: right - x, height: bottom - y }
    }
}

/// Character boxes in reading order: `x` strictly increases along the set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet(Vec<BoundingBox>);

impl CandidateSet {

    /// Order boxes left to right. Boxes sharing a left edge are merged into
    /// their union, which keeps the ordering strict. [`Segmenter::segment`]
    /// resolves shared edges itself before building the set.
    pub fn from_unordered(mut boxes: Vec<BoundingBox>) -> Self {
        boxes.sort_by_key(|b| (b.x, b.y));
        let mut ordered: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
        for b in boxes {
            match ordered.last_mut() {
                Some(last) if last.x == b.x => *last = last.union(&b),
                _ => ordered.push(b),
            }
        }
        Self(ordered)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[BoundingBox] {
        &self.0
    }

    fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a BoundingBox;
    type IntoIter = std::slice::Iter<'a, BoundingBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {

    pub fn new(config: SegmenterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// The image segmentation runs on. Boxes from [`Segmenter::segment`] refer
    /// to this image, so it is also the one glyphs are cut from.
    pub fn prepare(&self, plate: &PlateImage) -> PlateImage {
        match self.config.standard_width {
            Some(width) => plate.resize_to_width(width),
            None => plate.clone(),
        }
    }

    /// Binary mask with ink pixels at 255.
    pub fn foreground_mask(&self, plate: &PlateImage) -> GrayImage {
        let gray = plate.as_gray();
        match self.config.threshold {
            ThresholdPolicy::Otsu => otsu_inverted(gray),
            ThresholdPolicy::Adaptive { block_size, offset, method } => {
                adaptive_inverted(gray, block_size, offset, method)
            }
        }
    }

    /// Character boxes of `plate`, which must already be prepared.
    pub fn segment(&self, plate: &PlateImage) -> CandidateSet {
        let (width, height) = (plate.width(), plate.height());
        if width == 0 || height == 0 {
            return CandidateSet::default();
        }
        // one pixel of background all round, otherwise ink on the image
        // border is traced as a hole that parents every other contour
        let mask = self.foreground_mask(plate);
        let mut padded = GrayImage::from_pixel(width + 2, height + 2, Luma([BACKGROUND]));
        imageops::replace(&mut padded, &mask, 1, 1);
        let contours = contours::find_contours::<u32>(&padded);
        let total = contours.len();

        let mut accepted: Vec<(BoundingBox, f64)> = contours.iter().filter(|c| {
            c.border_type == BorderType::Outer && (!self.config.external_only || c.parent.is_none())
        }).filter_map(|c| {
            let [x, y, w, h] = utils::point_bounds(&c.points)?;
            let bbox = BoundingBox::new(x.saturating_sub(1), y.saturating_sub(1), w, h);
            let area = utils::polygon_area(&c.points);
            if self.accepts(&bbox, || area) {
                Some((bbox, area))
            } else {
                None
            }
        }).filter(|(b, _)| b.fits_within(width, height)).collect();

        accepted.sort_by_key(|(b, _)| (b.x, b.y));
        let mut boxes = Vec::with_capacity(accepted.len());
        for group in accepted.chunk_by(|a, b| a.0.x == b.0.x) {
            if let Some((first, rest)) = group.split_first() {
                boxes.push(self.merge_column(first, rest));
            }
        }

        let mut candidates = CandidateSet::from_unordered(boxes);
        if let Some(max) = self.config.max_candidates {
            candidates.truncate(max);
        }
        debug!("{} contours, {} character candidates", total, candidates.len());
        candidates
    }

    /// Boxes sharing a left edge become their union when the union still
    /// passes the filters, otherwise the largest of them.
    fn merge_column(&self, first: &(BoundingBox, f64), rest: &[(BoundingBox, f64)]) -> BoundingBox {
        if rest.is_empty() {
            return first.0;
        }
        let union = rest.iter().fold(first.0, |u, (b, _)| u.union(b));
        let area = first.1 + rest.iter().map(|(_, a)| a).sum::<f64>();
        if self.accepts(&union, || area) {
            return union;
        }
        let mut largest = first;
        for candidate in rest {
            if candidate.1 > largest.1 {
                largest = candidate;
            }
        }
        debug!("{:?} fails the filters, keeping {:?}", union, largest.0);
        largest.0
    }

    fn accepts(&self, bbox: &BoundingBox, area: impl FnOnce() -> f64) -> bool {
        let config = &self.config;
        if config.min_height.map_or(false, |min| bbox.height < min)
            || config.max_height.map_or(false, |max| bbox.height > max)
            || config.min_width.map_or(false, |min| bbox.width < min) {
            return false;
        }
        let aspect = bbox.aspect_ratio();
        if config.min_aspect.map_or(false, |min| aspect <= min)
            || config.max_aspect.map_or(false, |max| aspect >= max) {
            return false;
        }
        match config.min_area {
            Some(min) => area() > min,
            None => true,
        }
    }
}

fn otsu_inverted(gray: &GrayImage) -> GrayImage {
    match utils::otsu_split(gray) {
        Some(level) => {
            debug!("otsu level {}", level);
            binarize_below(gray, |_, _| level as i32)
        }
        // a flat image has no ink
        None => GrayImage::from_pixel(gray.width(), gray.height(), Luma([BACKGROUND])),
    }
}

fn adaptive_inverted(gray: &GrayImage, block_size: u32, offset: i32, method: AdaptiveMethod) -> GrayImage {
    let radius = block_size / 2;
    let local = match method {
        AdaptiveMethod::Mean => filter::box_filter(gray, radius, radius),
        AdaptiveMethod::Gaussian => {
            // sigma a gaussian kernel of this size gets by default in opencv
            let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
            filter::gaussian_blur_f32(gray, sigma)
        }
    };
    binarize_below(gray, |x, y| local.get_pixel(x, y).0[0] as i32 - offset)
}

// ink where the pixel is at or below the cut
fn binarize_below(gray: &GrayImage, cut: impl Fn(u32, u32) -> i32) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] as i32 <= cut(x, y) {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}
