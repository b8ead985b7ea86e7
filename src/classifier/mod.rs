//! Character classifiers.
//!
//! A classifier turns one [`GlyphBitmap`] into a class index over
//! [`ALPHABET`](crate::ALPHABET). It may run in process (a TensorFlow graph,
//! feature `tensorflow`) or on a device reached over HTTP or a serial line.

use serde::{ Deserialize, Serialize };

use std::path::PathBuf;
use std::time::Duration;

use crate::canonical::{ GlyphBitmap, PixelEncoding };
use crate::error::{ LprError, Result };

pub mod http;
pub mod serial;
#[cfg(feature = "tensorflow")]
pub mod local;

pub use self::http::HttpClassifier;
pub use self::serial::SerialClassifier;
#[cfg(feature = "tensorflow")]
pub use self::local::LocalClassifier;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// One classifier answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub index: usize,
    pub score: f32,
    /// inference time reported by the classifier
    #[serde(default)]
    pub time_ms: Option<f32>,
}

pub trait Classifier {
    fn classify(&mut self, glyph: &GlyphBitmap) -> Result<Prediction>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&mut self, glyph: &GlyphBitmap) -> Result<Prediction> {
        (**self).classify(glyph)
    }
}

/// Closure as a classifier.
pub struct FnClassifier<F>(pub F);

impl<F> Classifier for FnClassifier<F>
where F: FnMut(&GlyphBitmap) -> Result<Prediction>
{
    fn classify(&mut self, glyph: &GlyphBitmap) -> Result<Prediction> {
        (self.0)(glyph)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    Http {
        url: String,
        #[serde(default = "default_timeout")]
        timeout_ms: u64,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud_rate: u32,
        #[serde(default = "default_timeout")]
        timeout_ms: u64,
        #[serde(default = "default_ready")]
        ready_sentinel: String,
        #[serde(default = "default_result_prefix")]
        result_prefix: String,
    },
    Local {
        model: PathBuf,
        input_op: String,
        output_op: String,
    },
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_ready() -> String {
    serial::READY_SENTINEL.to_string()
}

fn default_result_prefix() -> String {
    serial::RESULT_PREFIX.to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::Http {
            url: "http://172.20.10.2/predict".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ClassifierConfig {

    /// Open the configured classifier. Remote classifiers are sent glyph
    /// bytes in `encoding`; the local one normalises pixels itself.
    pub fn connect(&self, encoding: PixelEncoding) -> Result<Box<dyn Classifier>> {
        match self {
            ClassifierConfig::Http { url, timeout_ms } => {
                let classifier = HttpClassifier::new(url, Duration::from_millis(*timeout_ms))?
                    .with_encoding(encoding);
                Ok(Box::new(classifier))
            }
            ClassifierConfig::Serial { port, baud_rate, timeout_ms, ready_sentinel, result_prefix } => {
                let classifier = SerialClassifier::open(port, *baud_rate, Duration::from_millis(*timeout_ms))?
                    .with_sentinels(ready_sentinel, result_prefix)
                    .with_encoding(encoding);
                Ok(Box::new(classifier))
            }
            #[cfg(feature = "tensorflow")]
            ClassifierConfig::Local { model, input_op, output_op } => {
                Ok(Box::new(LocalClassifier::load(model, input_op, output_op)?))
            }
            #[cfg(not(feature = "tensorflow"))]
            ClassifierConfig::Local { .. } => {
                Err(LprError::invalid_config("local classifier needs the `tensorflow` feature"))
            }
        }
    }
}

/// Reject indices the alphabet cannot map.
pub(crate) fn checked(prediction: Prediction) -> Result<Prediction> {
    if prediction.index < crate::ALPHABET.len() {
        Ok(prediction)
    } else {
        Err(LprError::protocol(format!("class index {} out of range", prediction.index)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_from_json() {
        let http: ClassifierConfig = serde_json::from_str(r#"{ "kind": "http", "url": "http://10.0.0.7/predict" }"#).unwrap();
        assert_eq!(http, ClassifierConfig::Http { url: "http://10.0.0.7/predict".to_string(), timeout_ms: 5000 });

        let serial: ClassifierConfig = serde_json::from_str(r#"{ "kind": "serial", "port": "/dev/ttyUSB0" }"#).unwrap();
        match serial {
            ClassifierConfig::Serial { baud_rate, ready_sentinel, result_prefix, .. } => {
                assert_eq!(baud_rate, 115_200);
                assert_eq!(ready_sentinel, "READY");
                assert_eq!(result_prefix, "RESULTADO_PREDICAO");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn out_of_range_index_is_protocol_error() {
        let err = checked(Prediction { index: 36, score: 0.9, time_ms: None }).unwrap_err();
        assert!(err.is_per_character());
        assert!(checked(Prediction { index: 35, score: 0.9, time_ms: None }).is_ok());
    }

    #[cfg(not(feature = "tensorflow"))]
    #[test]
    fn local_without_feature() {
        let config = ClassifierConfig::Local { model: "m.pb".into(), input_op: "in".into(), output_op: "out".into() };
        assert!(config.connect(PixelEncoding::Raw).is_err());
    }
}
