//! # Sequence Encoder
//!
//! The full path of one forward call: pack variable-length sequences into a
//! padded block, quantize it, dispatch it over the pool, dequantize the
//! output and trim it back to each sequence's true length.

use std::sync::Arc;
use tracing::debug;
use crate::accelerator::AcceleratorFactory;
use crate::config::{DeploymentConfig, ModelConfig};
use crate::dispatch::BatchDispatcher;
use crate::error::{DispatchError, Result};
use crate::pool::AcceleratorPool;
use crate::quantization::QuantizationCodec;
use crate::tensor::{PaddedBatch, Sequence, SequencePacker};

pub struct SequenceEncoder {
    packer: SequencePacker,
    codec: QuantizationCodec,
    dispatcher: BatchDispatcher,
}

impl SequenceEncoder {
    pub fn new(packer: SequencePacker, codec: QuantizationCodec, dispatcher: BatchDispatcher) -> Self {
        Self { packer, codec, dispatcher }
    }

    /// Opens the pool and wires the encoder as `config` describes, with the
    /// exponents of an already loaded model artifact.
    pub fn with_model<F>(config: &DeploymentConfig, model: &ModelConfig, factory: &F) -> Result<Self>
    where F: AcceleratorFactory + ?Sized
    {
        config.validate()?;
        let pool = Arc::new(AcceleratorPool::from_config(factory, &config.pool)?);
        let layout = &config.layout;
        Ok(Self::new(
            SequencePacker::new(layout.model_input_width, layout.hardware_pad_channels),
            QuantizationCodec::from_model(model, config.dispatch.overflow_policy),
            BatchDispatcher::from_config(pool, layout, &config.dispatch),
        ))
    }

    /// Like [`with_model`](Self::with_model), reading the model artifact from
    /// `config.model_dir`.
    pub fn from_config<F>(config: &DeploymentConfig, factory: &F) -> Result<Self>
    where F: AcceleratorFactory + ?Sized
    {
        let model = config.model_config()?;
        Self::with_model(config, &model, factory)
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    pub fn packer(&self) -> &SequencePacker {
        &self.packer
    }

    /// Encodes a batch of sequences; output `i` belongs to input `i` and has
    /// the same number of frames.
    pub async fn forward(&self, sequences: &[Sequence]) -> Result<Vec<Sequence>> {
        let batch = self.packer.pack(sequences)?;
        self.forward_padded(&batch).await
    }

    /// Encodes a block that is already padded to the hardware width.
    ///
    /// A block of any other width is rejected with [`DispatchError::Shape`]
    /// before anything reaches the hardware.
    pub async fn forward_padded(&self, batch: &PaddedBatch) -> Result<Vec<Sequence>> {
        let padded_width = self.packer.padded_width();
        if batch.width() != padded_width {
            return Err(DispatchError::Shape(format!(
                "block has width {}, hardware expects {padded_width}",
                batch.width()
            )));
        }
        let input = self.codec.quantize(batch)?;
        debug!(flow_batch = batch.batch(), frames = batch.frames(), "encoding batch");

        let output = self.dispatcher.dispatch(&input).await?;
        let values = self.codec.dequantize(&output);
        self.packer.unpack(&values, batch.lengths(), output.frames(), output.width())
    }
}
