use image::{ DynamicImage, Rgb, RgbImage };
use imageproc::{ drawing, rect };
use log::{ debug, info, warn };

use std::fs;
use std::path::{ Path, PathBuf };

use canonical::{ Canonicalizer, GlyphBitmap };
use classifier::{ Classifier, Prediction };
use config::{ FailurePolicy, LprConfig };
use error::Result;
use segment::{ BoundingBox, PlateImage, Segmenter };

pub mod canonical;
pub mod classifier;
pub mod config;
pub mod error;
pub mod segment;
pub mod utils;


/// Class labels in the order the classifier was trained on.
pub const ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn class_to_char(index: usize) -> Option<char> {
    ALPHABET.as_bytes().get(index).map(|&b| b as char)
}

/// Reads plates: segments the characters, canonicalizes each one and asks
/// the classifier for its label.
pub struct Lpr<C = Box<dyn Classifier>> {
    segmenter: Segmenter,
    canonicalizer: Canonicalizer,
    classifier: C,
    failure_policy: FailurePolicy,
    debug_dir: Option<PathBuf>,
}

impl Lpr {

    /// Build the pipeline and open the classifier `config` names.
    pub fn new(config: &LprConfig) -> Result<Self> {
        let classifier = config.classifier.connect(config.encoding)?;
        Self::with_classifier(config, classifier)
    }
}

impl<C: Classifier> Lpr<C> {

    pub fn with_classifier(config: &LprConfig, classifier: C) -> Result<Self> {
        config.validate()?;
        Ok(Lpr {
            segmenter: Segmenter::new(config.segmenter.clone())?,
            canonicalizer: Canonicalizer::new(config.canonicalizer.clone())?,
            classifier,
            failure_policy: config.failure_policy,
            debug_dir: config.debug_dir.clone(),
        })
    }

    /// Hand the classifier back, e.g. to unload a local model.
    pub fn into_classifier(self) -> C {
        self.classifier
    }

    pub fn recognize_file(&mut self, path: impl AsRef<Path>) -> Result<PlateReading> {
        let plate = PlateImage::open(path)?;
        self.recognize_plate(&plate)
    }

    /// Recognize one image
    pub fn recognize(&mut self, img: &DynamicImage) -> Result<PlateReading> {
        self.recognize_plate(&PlateImage::from_dynamic(img))
    }

    pub fn recognize_plate(&mut self, plate: &PlateImage) -> Result<PlateReading> {
        let (prepared, glyphs) = self.glyphs(plate)?;
        info!("{} characters found", glyphs.len());

        let mut text = String::new();
        let mut characters = Vec::with_capacity(glyphs.len());
        let total = glyphs.len();
        for (i, (bbox, glyph)) in glyphs.into_iter().enumerate() {
            let outcome = match self.classifier.classify(&glyph).and_then(classifier::checked) {
                Ok(prediction) => {
                    let character = class_to_char(prediction.index).unwrap_or('?');
                    info!("character [{}/{}]: {} (score {:.2}, {})",
                        i + 1, total, character, prediction.score, describe_time(prediction.time_ms));
                    text.push(character);
                    CharacterOutcome::Recognized { character, prediction }
                }
                Err(e) if e.is_per_character() && self.failure_policy == FailurePolicy::Skip => {
                    warn!("character [{}/{}] skipped: {}", i + 1, total, e);
                    CharacterOutcome::Failed(e.to_string())
                }
                Err(e) => return Err(e),
            };
            characters.push(CharacterReading { bbox, outcome });
        }
        info!("plate: {}", text);
        Ok(PlateReading { text, characters, plate: prepared })
    }

    /// Segment and canonicalize without classifying. The returned plate is
    /// the (possibly resized) image the boxes refer to.
    pub fn glyphs(&self, plate: &PlateImage) -> Result<(PlateImage, Vec<(BoundingBox, GlyphBitmap)>)> {
        let prepared = self.segmenter.prepare(plate);
        let boxes = self.segmenter.segment(&prepared);
        let margin = self.canonicalizer.config().crop_margin;

        let mut glyphs = Vec::with_capacity(boxes.len());
        for (i, bbox) in boxes.iter().enumerate() {
            let crop = prepared.crop(bbox, margin);
            let glyph = self.canonicalizer.canonicalize(&crop)?;
            debug!("glyph {} from {:?}", i, bbox);
            if let Some(dir) = &self.debug_dir {
                if let Err(e) = dump_glyph(dir, i, &glyph) {
                    warn!("could not write glyph {} to {:?}: {}", i, dir, e);
                }
            }
            glyphs.push((*bbox, glyph));
        }
        Ok((prepared, glyphs))
    }
}

fn dump_glyph(dir: &Path, index: usize, glyph: &GlyphBitmap) -> Result<()> {
    fs::create_dir_all(dir)?;
    glyph.save(dir.join(format!("char{}.png", index)))
}

fn describe_time(time_ms: Option<f32>) -> String {
    match time_ms {
        Some(t) => format!("{:.1} ms", t),
        None => "no timing".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CharacterOutcome {
    Recognized { character: char, prediction: Prediction },
    /// classification failed and the character was left out
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterReading {
    pub bbox: BoundingBox,
    pub outcome: CharacterOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    /// recognized characters, left to right
    pub text: String,
    pub characters: Vec<CharacterReading>,
    /// image the boxes refer to
    pub plate: PlateImage,
}

impl PlateReading {

    pub fn failures(&self) -> usize {
        self.characters.iter().filter(|c| matches!(c.outcome, CharacterOutcome::Failed(_))).count()
    }

    /// Plate with every candidate box drawn: green when read, red when not.
    pub fn annotate(&self) -> RgbImage {
        let mut canvas = DynamicImage::ImageLuma8(self.plate.as_gray().clone()).to_rgb8();
        for c in &self.characters {
            let color = match c.outcome {
                CharacterOutcome::Recognized { .. } => Rgb([0, 255, 0]),
                CharacterOutcome::Failed(_) => Rgb([255, 0, 0]),
            };
            let r = rect::Rect::at(c.bbox.x as i32, c.bbox.y as i32).of_size(c.bbox.width, c.bbox.height);
            drawing::draw_hollow_rect_mut(&mut canvas, r, color);
        }
        canvas
    }
}
