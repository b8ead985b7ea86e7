use log::debug;
use tensorflow::{ Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor };

use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Instant;

use super::{ checked, Classifier, Prediction };
use crate::canonical::GlyphBitmap;
use crate::error::{ LprError, Result };
use crate::utils;

/// Frozen TensorFlow graph run in process. Owns its session; dropping the
/// classifier (or calling [`LocalClassifier::unload`]) releases the model.
pub struct LocalClassifier {
    graph: Graph,
    session: Session,
    input_name: String,
    output_name: String,
}

impl LocalClassifier {

    pub fn load(pb_file: impl AsRef<Path>, input_name: &str, output_name: &str) -> Result<Self> {
        let mut pb_file = File::open(pb_file)?;
        let mut pb = Vec::new();
        pb_file.read_to_end(&mut pb)?;
        // import graph def
        let mut graph = Graph::new();
        let graph_def_options = ImportGraphDefOptions::new();
        graph.import_graph_def(&pb, &graph_def_options)?;
        // fail now rather than on the first glyph
        graph.operation_by_name_required(input_name)?;
        graph.operation_by_name_required(output_name)?;
        let session_option = SessionOptions::new();
        let session = Session::new(&session_option, &graph)?;
        Ok(Self { graph, session, input_name: input_name.to_string(), output_name: output_name.to_string() })
    }

    pub fn unload(self) -> Result<()> {
        let LocalClassifier { mut session, .. } = self;
        session.close()?;
        Ok(())
    }

    /// Class scores for one glyph, fed as `[1, size, size, 1]` in `[-1, 1]`.
    pub fn run(&self, glyph: &GlyphBitmap) -> Result<Vec<f32>> {
        let size = glyph.size() as u64;
        let values: Vec<f32> = glyph.as_bytes().iter().map(|&p| p as f32 / 127.5 - 1.0).collect();
        let input: Tensor<f32> = Tensor::new(&[1, size, size, 1]).with_values(&values)?;

        let graph = &self.graph;
        let mut args = SessionRunArgs::new();
        args.add_feed(&graph.operation_by_name_required(&self.input_name)?, 0, &input);
        let token = args.request_fetch(&graph.operation_by_name_required(&self.output_name)?, 0);
        self.session.run(&mut args)?;
        let res: Tensor<f32> = args.fetch(token)?;
        Ok(res.to_vec())
    }
}

impl Classifier for LocalClassifier {

    fn classify(&mut self, glyph: &GlyphBitmap) -> Result<Prediction> {
        let start = Instant::now();
        let scores = self.run(glyph)?;
        let time_ms = start.elapsed().as_secs_f32() * 1000.0;
        let (index, score) = utils::argmax(&scores)
            .ok_or_else(|| LprError::protocol("model returned no scores"))?;
        debug!("local model: class {} score {} in {:.1} ms", index, score, time_ms);
        checked(Prediction { index, score, time_ms: Some(time_ms) })
    }
}
