#![cfg(feature = "backend-tract")]

//! Tract-based ONNX inference engine.
//!
//! Expects a model graph whose outputs carry sigmoid activation already;
//! raw-logit exports will decode to garbage.

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::{HeadTensor, ANCHORS_PER_HEAD, MODEL_INPUT};
use crate::infer::{InferenceEngine, ModelInput};

const BOX_CHANNELS: usize = 5;

pub struct TractEngine {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
}

impl TractEngine {
    /// Load an ONNX model and prepare it for 640x640 RGB inference.
    pub fn load(model_path: &str) -> Result<Self> {
        let side = MODEL_INPUT as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model })
    }

    fn build_input(&self, input: &ModelInput) -> Tensor {
        let side = MODEL_INPUT as usize;
        let pixels = input.pixels();
        let array = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            pixels[(y * side + x) * 3 + c] as f32 / 255.0
        });
        array.into_tensor()
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, input: &ModelInput) -> Result<Vec<HeadTensor>> {
        let tensor = self.build_input(input);
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;

        let mut heads = Vec::with_capacity(outputs.len());
        for output in outputs.iter() {
            let view = output
                .to_array_view::<f32>()
                .context("model output tensor was not f32")?;
            let shape = view.shape();
            if shape.len() != 4 || shape[0] != 1 {
                return Err(anyhow!(
                    "expected head shape [1, channels, grid_h, grid_w], got {:?}",
                    shape
                ));
            }
            let channels = shape[1];
            if channels % ANCHORS_PER_HEAD != 0 || channels / ANCHORS_PER_HEAD <= BOX_CHANNELS {
                return Err(anyhow!("head channel count {} is not 3*(5+classes)", channels));
            }
            let num_classes = channels / ANCHORS_PER_HEAD - BOX_CHANNELS;
            let data: Vec<f32> = view.iter().copied().collect();
            heads.push(HeadTensor::from_vec(data, num_classes, shape[2], shape[3])?);
        }

        Ok(heads)
    }
}
