use crate::error::{DispatchError, Result};
use super::buffer::PaddedBatch;

/// # Sequence
///
/// A variable-length run of feature vectors, stored frame after frame in one
/// flat vector. The true length is the number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    width: usize,
    values: Vec<f32>,
}

impl Sequence {
    /// Builds a sequence from flat values of `width` features per frame.
    pub fn new(width: usize, values: Vec<f32>) -> Result<Self> {
        if width == 0 {
            return Err(DispatchError::Shape("sequence width must be positive".to_string()));
        }
        if values.len() % width != 0 {
            return Err(DispatchError::Shape(format!(
                "{} values do not divide into frames of width {width}",
                values.len()
            )));
        }
        Ok(Self { width, values })
    }

    /// Builds a sequence from one vector per frame.
    pub fn from_frames(width: usize, frames: &[Vec<f32>]) -> Result<Self> {
        if let Some(frame) = frames.iter().find(|frame| frame.len() != width) {
            return Err(DispatchError::Shape(format!(
                "frame of width {} in a sequence of width {width}",
                frame.len()
            )));
        }
        Self::new(width, frames.concat())
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.values.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn frame(&self, index: usize) -> &[f32] {
        &self.values[index * self.width..(index + 1) * self.width]
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.width)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Longest sequence in a batch, or 0 if the batch is empty.
    pub fn max_len(sequences: &[Sequence]) -> usize {
        sequences.iter()
            .map(|sequence| sequence.len())
            .max()
            .unwrap_or(0)
    }
}

/// # SequencePacker
///
/// Converts between variable-length [`Sequence`]s and the fixed
/// `(batch, frames, padded_width)` block the accelerators consume.
///
/// Frames are padded at the end of each sequence up to the longest one in the
/// batch, and every frame is widened from `model_input_width` to
/// `model_input_width + hardware_pad_channels` with zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePacker {
    model_input_width: usize,
    hardware_pad_channels: usize,
}

impl SequencePacker {
    pub fn new(model_input_width: usize, hardware_pad_channels: usize) -> Self {
        Self { model_input_width, hardware_pad_channels }
    }

    pub fn model_input_width(&self) -> usize {
        self.model_input_width
    }

    pub fn padded_width(&self) -> usize {
        self.model_input_width + self.hardware_pad_channels
    }

    /// Pads a batch of sequences into one block.
    pub fn pack(&self, sequences: &[Sequence]) -> Result<PaddedBatch> {
        let frames = Sequence::max_len(sequences);
        let width = self.padded_width();
        let mut data = vec![0.0; sequences.len() * frames * width];
        let mut lengths = Vec::with_capacity(sequences.len());

        for (row, sequence) in sequences.iter().enumerate() {
            if sequence.width() != self.model_input_width {
                return Err(DispatchError::Shape(format!(
                    "sequence {row} has width {}, model expects {}",
                    sequence.width(),
                    self.model_input_width
                )));
            }
            let row_start = row * frames * width;
            for (index, frame) in sequence.frames().enumerate() {
                let offset = row_start + index * width;
                data[offset..offset + self.model_input_width].copy_from_slice(frame);
            }
            lengths.push(sequence.len());
        }

        PaddedBatch::new(sequences.len(), frames, width, lengths, data)
    }

    /// Pads a block that is already frame-padded but still at the model width,
    /// such as the output of a tensor library's pad operation.
    ///
    /// Values past each row's true length are zeroed, since upstream padding
    /// values are not guaranteed to be zero.
    pub fn pad_block(
        &self,
        batch: usize,
        frames: usize,
        values: &[f32],
        lengths: &[usize],
    ) -> Result<PaddedBatch> {
        let model_width = self.model_input_width;
        if values.len() != batch * frames * model_width {
            return Err(DispatchError::Shape(format!(
                "block of shape [{batch}, {frames}, {model_width}] needs {} values, got {}",
                batch * frames * model_width,
                values.len()
            )));
        }
        if lengths.len() != batch {
            return Err(DispatchError::Shape(format!(
                "{} lengths supplied for a batch of {batch}",
                lengths.len()
            )));
        }

        let width = self.padded_width();
        let mut data = vec![0.0; batch * frames * width];
        for (row, &length) in lengths.iter().enumerate() {
            for frame in 0..length.min(frames) {
                let src = (row * frames + frame) * model_width;
                let dst = (row * frames + frame) * width;
                data[dst..dst + model_width].copy_from_slice(&values[src..src + model_width]);
            }
        }

        PaddedBatch::new(batch, frames, width, lengths.to_vec(), data)
    }

    /// Trims a dequantized output block back into one sequence per row.
    ///
    /// `values` is laid out as `(lengths.len(), frames, output_width)`; row
    /// `i` keeps its first `lengths[i]` frames.
    pub fn unpack(
        &self,
        values: &[f32],
        lengths: &[usize],
        frames: usize,
        output_width: usize,
    ) -> Result<Vec<Sequence>> {
        let row_len = frames * output_width;
        if values.len() != lengths.len() * row_len {
            return Err(DispatchError::Shape(format!(
                "output of {} values does not hold {} rows of {frames}x{output_width}",
                values.len(),
                lengths.len()
            )));
        }

        lengths.iter()
            .enumerate()
            .map(|(index, &length)| {
                if length > frames {
                    return Err(DispatchError::Shape(format!(
                        "sequence length {length} exceeds {frames} frames"
                    )));
                }
                let row_start = index * row_len;
                let row = &values[row_start..row_start + length * output_width];
                Sequence::new(output_width, row.to_vec())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(width: usize, frames: usize, start: f32) -> Sequence {
        let values = (0..width * frames).map(|v| start + v as f32).collect();
        Sequence::new(width, values).unwrap()
    }

    #[test]
    fn test_sequence_len_and_frames() {
        let sequence = Sequence::from_frames(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.frame(1), &[3.0, 4.0]);
        assert!(!sequence.is_empty());
    }

    #[test]
    fn test_sequence_rejects_ragged_values() {
        assert!(Sequence::new(3, vec![0.0; 4]).is_err());
        assert!(Sequence::new(0, vec![]).is_err());
        assert!(Sequence::from_frames(2, &[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_max_len_for_empty_collection() {
        assert_eq!(0, Sequence::max_len(&[]));
    }

    #[test]
    fn test_pack_pads_frames_and_channels() {
        let packer = SequencePacker::new(2, 1);
        let batch = packer.pack(&[seq(2, 2, 1.0), seq(2, 1, 10.0)]).unwrap();

        assert_eq!(batch.batch(), 2);
        assert_eq!(batch.frames(), 2);
        assert_eq!(batch.width(), 3);
        assert_eq!(batch.lengths(), &[2, 1]);
        assert_eq!(
            batch.as_slice(),
            &[
                1.0, 2.0, 0.0, 3.0, 4.0, 0.0,
                10.0, 11.0, 0.0, 0.0, 0.0, 0.0,
            ]
        );
    }

    #[test]
    fn test_pack_rejects_wrong_width() {
        let packer = SequencePacker::new(3, 1);
        let err = packer.pack(&[seq(2, 1, 0.0)]).unwrap_err();
        assert!(err.to_string().contains("model expects 3"));
    }

    #[test]
    fn test_pack_empty_batch() {
        let packer = SequencePacker::new(200, 24);
        let batch = packer.pack(&[]).unwrap();
        assert_eq!(batch.batch(), 0);
        assert!(batch.as_slice().is_empty());
    }

    #[test]
    fn test_pad_block_zeroes_past_length() {
        let packer = SequencePacker::new(1, 1);
        let batch = packer.pad_block(2, 2, &[1.0, 9.0, 2.0, 3.0], &[1, 2]).unwrap();
        assert_eq!(batch.as_slice(), &[1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_unpack_trims_to_lengths() {
        let packer = SequencePacker::new(2, 0);
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let sequences = packer.unpack(&values, &[3, 1], 3, 2).unwrap();

        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(sequences[1].as_slice(), &[6.0, 7.0]);
    }

    #[test]
    fn test_unpack_rejects_short_output() {
        let packer = SequencePacker::new(2, 0);
        assert!(packer.unpack(&[0.0; 5], &[1, 1], 1, 3).is_err());
    }
}
