use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use std::time::Duration;

use super::{ checked, Classifier, Prediction };
use crate::canonical::{ GlyphBitmap, PixelEncoding };
use crate::error::{ LprError, Result };

/// Posts raw glyph bytes to a device and reads back
/// `{"index": .., "score": .., "time_ms": ..}`.
pub struct HttpClassifier {
    client: Client,
    url: String,
    encoding: PixelEncoding,
}

impl HttpClassifier {

    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into(), encoding: PixelEncoding::Raw })
    }

    pub fn with_encoding(mut self, encoding: PixelEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Classifier for HttpClassifier {

    fn classify(&mut self, glyph: &GlyphBitmap) -> Result<Prediction> {
        let body = glyph.encode(self.encoding);
        debug!("POST {} bytes to {}", body.len(), self.url);
        let response = self.client.post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(LprError::transport(format!("{} answered {}", self.url, status)));
        }
        let bytes = response.bytes()?;
        let prediction: Prediction = serde_json::from_slice(&bytes)
            .map_err(|e| LprError::protocol(format!("{}: {}", e, String::from_utf8_lossy(&bytes))))?;
        checked(prediction)
    }
}
