use crate::error::{DispatchError, Result};
use super::constant::{BATCH_DIM, BYTES_PER_VALUE, FRAME_DIM};

/// Checks that a flat buffer holds exactly `batch * frames * width` values.
fn check_len(kind: &str, shape: [usize; 3], len: usize) -> Result<()> {
    let expected = shape.iter().product::<usize>();
    if expected != len {
        return Err(DispatchError::Shape(format!(
            "{kind} of shape {shape:?} needs {expected} values, got {len}"
        )));
    }
    Ok(())
}

/// # PaddedBatch
///
/// A float block of shape `(batch, frames, width)` in row-major order.
///
/// Every sequence occupies one row along the batch dimension. Values past a
/// sequence's true length, and past the model's native feature width, are
/// zero. The true lengths travel with the block so the output side can trim
/// rows back to their original size.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedBatch {
    shape: [usize; 3],
    lengths: Vec<usize>,
    data: Vec<f32>,
}

impl PaddedBatch {
    /// Wraps an already padded block.
    ///
    /// Fails with [`DispatchError::Shape`] when `data` does not match the
    /// shape, when there is not exactly one length per row, or when a length
    /// exceeds the frame count.
    pub fn new(
        batch: usize,
        frames: usize,
        width: usize,
        lengths: Vec<usize>,
        data: Vec<f32>,
    ) -> Result<Self> {
        let shape = [batch, frames, width];
        check_len("padded batch", shape, data.len())?;
        if lengths.len() != batch {
            return Err(DispatchError::Shape(format!(
                "{} lengths supplied for a batch of {batch}",
                lengths.len()
            )));
        }
        if let Some(&too_long) = lengths.iter().find(|&&len| len > frames) {
            return Err(DispatchError::Shape(format!(
                "sequence length {too_long} exceeds {frames} frames"
            )));
        }
        Ok(Self { shape, lengths, data })
    }

    pub fn batch(&self) -> usize {
        self.shape[BATCH_DIM]
    }

    pub fn frames(&self) -> usize {
        self.shape[FRAME_DIM]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    /// True sequence length of every row
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// # FixedPointBuffer
///
/// A flat `i16` block of shape `(batch, frames, width)`, the native numeric
/// format of the accelerators.
///
/// On the input side the width is the hardware padded width; on the output
/// side (see [`OutputBlock`]) it is the model's output width. Rows are
/// contiguous, so a run of rows `[start, start + count)` is a single slice,
/// which is what lets the dispatcher hand each accelerator a borrowed window
/// instead of a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPointBuffer {
    shape: [usize; 3],
    data: Vec<i16>,
}

/// The buffer a dispatch writes into. Same layout as the input buffer, with
/// the output width as its last dimension.
pub type OutputBlock = FixedPointBuffer;

impl FixedPointBuffer {
    /// Allocates a zero-filled buffer.
    pub fn zeros(batch: usize, frames: usize, width: usize) -> Self {
        Self {
            shape: [batch, frames, width],
            data: vec![0; batch * frames * width],
        }
    }

    /// Wraps existing values, failing when they do not match the shape.
    pub fn from_vec(batch: usize, frames: usize, width: usize, data: Vec<i16>) -> Result<Self> {
        let shape = [batch, frames, width];
        check_len("fixed point buffer", shape, data.len())?;
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn batch(&self) -> usize {
        self.shape[BATCH_DIM]
    }

    pub fn frames(&self) -> usize {
        self.shape[FRAME_DIM]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    /// Number of values in one batch row
    pub fn row_len(&self) -> usize {
        self.frames() * self.width()
    }

    /// Size in bytes of one batch row, as declared to the hardware
    pub fn item_bytes(&self) -> usize {
        self.row_len() * BYTES_PER_VALUE
    }

    /// Borrow `count` contiguous rows starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range runs past the batch dimension.
    pub fn rows(&self, start: usize, count: usize) -> &[i16] {
        let row_len = self.row_len();
        &self.data[start * row_len..(start + count) * row_len]
    }

    /// Mutable counterpart of [`rows`](Self::rows).
    pub fn rows_mut(&mut self, start: usize, count: usize) -> &mut [i16] {
        let row_len = self.row_len();
        &mut self.data[start * row_len..(start + count) * row_len]
    }

    pub fn row(&self, index: usize) -> &[i16] {
        self.rows(index, 1)
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<i16> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_batch_rejects_bad_length() {
        let err = PaddedBatch::new(2, 3, 4, vec![3, 3], vec![0.0; 23]).unwrap_err();
        assert!(matches!(err, DispatchError::Shape(_)));
    }

    #[test]
    fn test_padded_batch_rejects_length_past_frames() {
        let err = PaddedBatch::new(1, 3, 2, vec![4], vec![0.0; 6]).unwrap_err();
        assert!(err.to_string().contains("exceeds 3 frames"));
    }

    #[test]
    fn test_padded_batch_requires_one_length_per_row() {
        assert!(PaddedBatch::new(2, 1, 1, vec![1], vec![0.0; 2]).is_err());
    }

    #[test]
    fn test_zeros_shape() {
        let buffer = FixedPointBuffer::zeros(3, 5, 224);
        assert_eq!(buffer.shape(), [3, 5, 224]);
        assert_eq!(buffer.row_len(), 5 * 224);
        assert_eq!(buffer.item_bytes(), 5 * 224 * 2);
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_rows_are_contiguous_windows() {
        let data: Vec<i16> = (0..12).collect();
        let mut buffer = FixedPointBuffer::from_vec(3, 2, 2, data).unwrap();

        assert_eq!(buffer.row(1), &[4, 5, 6, 7]);
        assert_eq!(buffer.rows(1, 2), &[4, 5, 6, 7, 8, 9, 10, 11]);

        buffer.rows_mut(2, 1).fill(-1);
        assert_eq!(buffer.row(2), &[-1, -1, -1, -1]);
        assert_eq!(buffer.row(0), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_batch_has_no_rows() {
        let buffer = FixedPointBuffer::zeros(0, 4, 300);
        assert_eq!(buffer.rows(0, 0), &[] as &[i16]);
        assert!(buffer.into_vec().is_empty());
    }

    #[test]
    fn test_from_vec_rejects_mismatch() {
        assert!(FixedPointBuffer::from_vec(1, 2, 3, vec![0; 5]).is_err());
    }
}
