//! Deployment configuration for the recognition pipeline.
//!
//! Every threshold the pipeline uses lives here. `Default` reproduces the
//! HTTP deployment: Otsu segmentation on a 600 px wide plate, seven character
//! cap, 75% occupied 64x64 white canvas, binarized before and after resizing.

use serde::{ Deserialize, Serialize };

use std::fs;
use std::path::{ Path, PathBuf };

use crate::canonical::PixelEncoding;
use crate::classifier::ClassifierConfig;
use crate::error::{ LprError, Result };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LprConfig {
    pub segmenter: SegmenterConfig,
    pub canonicalizer: CanonicalizerConfig,
    pub classifier: ClassifierConfig,
    pub failure_policy: FailurePolicy,
    pub encoding: PixelEncoding,
    /// every glyph bitmap is written here as `char{i}.png` when set
    pub debug_dir: Option<PathBuf>,
}

impl Default for LprConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            canonicalizer: CanonicalizerConfig::default(),
            classifier: ClassifierConfig::default(),
            failure_policy: FailurePolicy::Skip,
            encoding: PixelEncoding::Raw,
            debug_dir: None,
        }
    }
}

impl LprConfig {

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.segmenter.validate()?;
        self.canonicalizer.validate()
    }
}

/// How foreground (ink) pixels are separated from the plate background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// a pixel is ink when it is darker than its neighbourhood mean by more
    /// than `offset`
    Adaptive {
        block_size: u32,
        offset: i32,
        method: AdaptiveMethod,
    },
    /// single global level picked by Otsu's method
    Otsu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    Mean,
    Gaussian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// plate is resized to this width before thresholding
    pub standard_width: Option<u32>,
    pub threshold: ThresholdPolicy,
    /// inclusive height and width bounds in pixels
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub min_width: Option<u32>,
    /// exclusive lower bound on the polygon area enclosed by the
    /// component's outer border
    pub min_area: Option<f64>,
    /// exclusive lower bound on width / height
    pub min_aspect: Option<f64>,
    /// exclusive upper bound on width / height
    pub max_aspect: Option<f64>,
    /// keep only the leftmost N candidates
    pub max_candidates: Option<usize>,
    /// ignore components nested inside the holes of other components
    pub external_only: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            standard_width: Some(600),
            threshold: ThresholdPolicy::Otsu,
            min_height: None,
            max_height: None,
            min_width: None,
            min_area: Some(500.0),
            min_aspect: Some(0.2),
            max_aspect: Some(1.0),
            max_candidates: Some(7),
            external_only: true,
        }
    }
}

impl SegmenterConfig {

    /// Close-range variant: adaptive gaussian threshold and height gating,
    /// for high resolution captures with uneven lighting.
    pub fn close_range() -> Self {
        Self {
            standard_width: None,
            threshold: ThresholdPolicy::Adaptive { block_size: 11, offset: 2, method: AdaptiveMethod::Gaussian },
            min_height: Some(151),
            max_height: Some(699),
            min_width: Some(21),
            min_area: None,
            min_aspect: None,
            max_aspect: None,
            max_candidates: None,
            external_only: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.standard_width == Some(0) {
            return Err(LprError::invalid_config("standard_width must be positive"));
        }
        if let ThresholdPolicy::Adaptive { block_size, .. } = self.threshold {
            if block_size < 3 || block_size % 2 == 0 {
                return Err(LprError::invalid_config(format!(
                    "adaptive block_size must be odd and at least 3, got {}", block_size)));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_height, self.max_height) {
            if lo > hi {
                return Err(LprError::invalid_config(format!("min_height {} exceeds max_height {}", lo, hi)));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_aspect, self.max_aspect) {
            if lo > hi {
                return Err(LprError::invalid_config(format!("min_aspect {} exceeds max_aspect {}", lo, hi)));
            }
        }
        Ok(())
    }
}

/// Canvas colour behind the glyph. Must match the classifier's training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    White,
    Black,
}

impl Background {
    pub fn value(self) -> u8 {
        match self {
            Background::White => 255,
            Background::Black => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binarization {
    /// grayscale values are kept as resized
    Passthrough,
    /// hard cut after placement, producing pure {0, 255}
    Threshold { cut: u8 },
    /// Otsu binarization of the source, optional stroke pass, resize, then a
    /// hard cut to remove the grey fringe the resize introduces
    PrePost { cut: u8 },
}

/// Stroke weight normalisation, radius in pixels of an L-infinity
/// structuring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeAdjust {
    Thicken(u8),
    Thin(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalizerConfig {
    /// side of the square output canvas
    pub size: u32,
    /// share of the canvas the glyph's longer side occupies
    pub occupied_fraction: f64,
    pub background: Background,
    pub binarization: Binarization,
    /// only with `PrePost`, applied to the binarized source. Every pass
    /// thickens or thins again, so output fed back in does not come out
    /// unchanged.
    pub stroke: Option<StrokeAdjust>,
    /// when false, glyphs already smaller than the target are not enlarged
    pub upscale: bool,
    /// extra pixels taken around each box when slicing the plate
    pub crop_margin: u32,
}

impl Default for CanonicalizerConfig {
    fn default() -> Self {
        Self {
            size: 64,
            occupied_fraction: 0.75,
            background: Background::White,
            binarization: Binarization::PrePost { cut: 128 },
            stroke: Some(StrokeAdjust::Thicken(1)),
            upscale: true,
            crop_margin: 0,
        }
    }
}

impl CanonicalizerConfig {

    /// 52 px glyph in a 64 px canvas, grayscale, five pixel crop margin.
    pub fn grayscale_52() -> Self {
        Self {
            size: 64,
            occupied_fraction: 52.0 / 64.0,
            background: Background::White,
            binarization: Binarization::Passthrough,
            stroke: None,
            upscale: true,
            crop_margin: 5,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(LprError::invalid_config("canvas size must be positive"));
        }
        if !(self.occupied_fraction > 0.0 && self.occupied_fraction <= 1.0) {
            return Err(LprError::invalid_config(format!(
                "occupied_fraction must be in (0, 1], got {}", self.occupied_fraction)));
        }
        match (self.stroke, self.binarization) {
            (Some(_), Binarization::PrePost { .. }) | (None, _) => Ok(()),
            (Some(_), _) => Err(LprError::invalid_config("stroke adjustment needs pre_post binarization")),
        }
    }

    /// Pixels the glyph's longer side maps to.
    pub fn target_extent(&self) -> f64 {
        self.occupied_fraction * self.size as f64
    }
}

/// What happens to the plate when one character's classification fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// leave the character out and carry on
    Skip,
    /// fail the whole plate
    Abort,
}
