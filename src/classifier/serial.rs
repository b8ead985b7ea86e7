//! Serial line protocol.
//!
//! The device prints a ready line when it can take a glyph, receives exactly
//! `size * size` bytes, and answers with `RESULTADO_PREDICAO:<index>:<score>`
//! (optionally followed by `:<time_ms>`). Any other line is device chatter
//! and is skipped.

use log::{ debug, trace };
use serialport::SerialPort;

use std::io::{ BufRead, BufReader, Read, Write };
use std::time::{ Duration, Instant };

use super::{ checked, Classifier, Prediction };
use crate::canonical::{ GlyphBitmap, PixelEncoding };
use crate::error::{ LprError, Result };

pub const READY_SENTINEL: &str = "READY";
pub const RESULT_PREFIX: &str = "RESULTADO_PREDICAO";

pub struct SerialClassifier<P> {
    port: BufReader<P>,
    timeout: Duration,
    ready: String,
    result_prefix: String,
    encoding: PixelEncoding,
}

impl SerialClassifier<Box<dyn SerialPort>> {

    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        debug!("opened {} at {} baud", path, baud_rate);
        Ok(Self::new(port, timeout))
    }
}

impl<P: Read + Write> SerialClassifier<P> {

    /// `timeout` bounds one whole exchange, ready line to result line.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port: BufReader::new(port),
            timeout,
            ready: READY_SENTINEL.to_string(),
            result_prefix: RESULT_PREFIX.to_string(),
            encoding: PixelEncoding::Raw,
        }
    }

    pub fn with_sentinels(mut self, ready: &str, result_prefix: &str) -> Self {
        self.ready = ready.to_string();
        self.result_prefix = result_prefix.to_string();
        self
    }

    pub fn with_encoding(mut self, encoding: PixelEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn into_inner(self) -> P {
        self.port.into_inner()
    }

    fn next_line(&mut self, deadline: Instant) -> Result<String> {
        if Instant::now() > deadline {
            return Err(LprError::transport("serial exchange timed out"));
        }
        let mut raw = Vec::new();
        let read = self.port.read_until(b'\n', &mut raw)
            .map_err(|e| LprError::transport(format!("serial read failed: {}", e)))?;
        if read == 0 {
            return Err(LprError::transport("serial port closed"));
        }
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        trace!("serial < {}", line);
        Ok(line)
    }

    fn parse_result(&self, line: &str) -> Result<Prediction> {
        let mut fields = line.split(':').skip(1).map(str::trim);
        let index = fields.next()
            .and_then(|f| f.parse::<usize>().ok())
            .ok_or_else(|| LprError::protocol(format!("bad class index in {:?}", line)))?;
        let score = fields.next()
            .and_then(|f| f.parse::<f32>().ok())
            .ok_or_else(|| LprError::protocol(format!("bad score in {:?}", line)))?;
        let time_ms = match fields.next() {
            Some(f) => Some(f.parse::<f32>()
                .map_err(|_| LprError::protocol(format!("bad time in {:?}", line)))?),
            None => None,
        };
        checked(Prediction { index, score, time_ms })
    }
}

impl<P: Read + Write> Classifier for SerialClassifier<P> {

    fn classify(&mut self, glyph: &GlyphBitmap) -> Result<Prediction> {
        let deadline = Instant::now() + self.timeout;
        while self.next_line(deadline)? != self.ready {}

        let bytes = glyph.encode(self.encoding);
        let port = self.port.get_mut();
        port.write_all(&bytes)
            .and_then(|_| port.flush())
            .map_err(|e| LprError::transport(format!("serial write failed: {}", e)))?;
        debug!("sent {} bytes over serial", bytes.len());

        let prefix = format!("{}:", self.result_prefix);
        loop {
            let line = self.next_line(deadline)?;
            if line.starts_with(&prefix) {
                return self.parse_result(&line);
            }
        }
    }
}
