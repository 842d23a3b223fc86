//! Inference engines.
//!
//! An engine takes one preprocessed model input and returns one raw tensor
//! per output head, sigmoid-activated. A `stub://` model path selects the
//! synthetic engine; ONNX models run through tract behind the
//! `backend-tract` feature.

use anyhow::Result;

use crate::detect::{HeadTensor, MODEL_INPUT};

mod stub;
#[cfg(feature = "backend-tract")]
mod tract;

pub use stub::StubEngine;
#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;

/// RGB pixels resized to the model input resolution.
pub struct ModelInput {
    pixels: Vec<u8>,
}

impl ModelInput {
    pub fn from_rgb(pixels: Vec<u8>) -> Result<Self> {
        let expected = (MODEL_INPUT * MODEL_INPUT * 3) as usize;
        anyhow::ensure!(
            pixels.len() == expected,
            "model input must be {}x{} RGB ({} bytes), received {}",
            MODEL_INPUT,
            MODEL_INPUT,
            expected,
            pixels.len()
        );
        Ok(Self { pixels })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Inference engine seam.
///
/// Implementations must hand back tensors with activation already applied;
/// the decoder performs none. A failed pass surfaces as an error and the
/// monitor treats it as "skip this cycle".
pub trait InferenceEngine: Send {
    /// Engine identifier for logs.
    fn name(&self) -> &'static str;

    /// Run one inference pass, returning one tensor per output head.
    fn infer(&mut self, input: &ModelInput) -> Result<Vec<HeadTensor>>;
}

/// Load the engine for a model path.
///
/// `stub://fail-load` fails here (exercises the acquisition retry path);
/// other `stub://` directives select the synthetic engine.
pub fn load_engine(model_path: &str) -> Result<Box<dyn InferenceEngine>> {
    if let Some(directive) = model_path.strip_prefix("stub://") {
        if directive == "fail-load" {
            anyhow::bail!("cannot load model {}", model_path);
        }
        return Ok(Box::new(StubEngine::from_directive(directive)));
    }

    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(tract::TractEngine::load(model_path)?))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        anyhow::bail!(
            "model {} requires the backend-tract feature",
            model_path
        );
    }
}
