use crate::error::{DispatchError, Result};
use crate::tensor::{PaddedBatch, Sequence, SequencePacker};

/// # SequenceTensor
///
/// A rank-3 float tensor laid out as `[batch, frames, features]` that can
/// feed an encoder and hold its output.
///
/// Implementors provide the three primitive conversions; packing and
/// unpacking against sequence lengths come for free.
pub trait SequenceTensor: Sized {
    type Device;

    /// `[batch, frames, features]`, or a shape error if the tensor is not rank 3.
    fn block_shape(&self) -> Result<[usize; 3]>;

    /// All values in row-major order, converted to `f32`.
    fn to_f32_vec(&self) -> Result<Vec<f32>>;

    fn from_f32_vec(values: Vec<f32>, shape: [usize; 3], device: &Self::Device) -> Result<Self>;

    /// Pads a `[batch, frames, model_input_width]` block to the hardware
    /// width, zeroing frames at or past each row's length.
    fn to_padded_batch(&self, lengths: &[usize], packer: &SequencePacker) -> Result<PaddedBatch> {
        let [batch, frames, _] = self.block_shape()?;
        let values = self.to_f32_vec()?;
        packer.pad_block(batch, frames, &values, lengths)
    }

    /// Stacks encoded sequences into a zero-padded `[batch, max_len, width]` tensor.
    fn from_sequences(sequences: &[Sequence], device: &Self::Device) -> Result<Self> {
        let frames = Sequence::max_len(sequences);
        let width = sequences.first().map_or(0, Sequence::width);
        let mut values = vec![0.0; sequences.len() * frames * width];

        for (row, sequence) in sequences.iter().enumerate() {
            if sequence.width() != width {
                return Err(DispatchError::Shape(format!(
                    "sequence {row} has width {}, expected {width}",
                    sequence.width()
                )));
            }
            let start = row * frames * width;
            values[start..start + sequence.as_slice().len()].copy_from_slice(sequence.as_slice());
        }

        Self::from_f32_vec(values, [sequences.len(), frames, width], device)
    }
}
