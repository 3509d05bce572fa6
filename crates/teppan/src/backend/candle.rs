use candle_core::{DType, Device, Tensor};
use crate::error::{DispatchError, Result};
use super::SequenceTensor;

fn shape_error(e: candle_core::Error) -> DispatchError {
    DispatchError::Shape(e.to_string())
}

impl SequenceTensor for Tensor {
    type Device = Device;

    fn block_shape(&self) -> Result<[usize; 3]> {
        let (batch, frames, features) = self.dims3().map_err(shape_error)?;
        Ok([batch, frames, features])
    }

    fn to_f32_vec(&self) -> Result<Vec<f32>> {
        self.to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(shape_error)
    }

    fn from_f32_vec(values: Vec<f32>, shape: [usize; 3], device: &Device) -> Result<Self> {
        Tensor::from_vec(values, (shape[0], shape[1], shape[2]), device).map_err(shape_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Sequence, SequencePacker};

    #[test]
    fn test_padded_batch_from_candle_tensor() {
        let tensor = Tensor::arange(0f32, 12f32, &Device::Cpu)
            .unwrap()
            .reshape((2, 3, 2))
            .unwrap();
        let packer = SequencePacker::new(2, 2);

        let batch = tensor.to_padded_batch(&[3, 1], &packer).unwrap();

        assert_eq!((batch.batch(), batch.frames(), batch.width()), (2, 3, 4));
        assert_eq!(&batch.as_slice()[..4], &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&batch.as_slice()[12..16], &[6.0, 7.0, 0.0, 0.0]);
        assert!(batch.as_slice()[16..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rank_two_tensor_is_shape_error() {
        let tensor = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        let packer = SequencePacker::new(3, 0);

        assert!(matches!(
            tensor.to_padded_batch(&[1, 1], &packer),
            Err(DispatchError::Shape(_))
        ));
    }

    #[test]
    fn test_candle_tensor_from_sequences() {
        let sequences = vec![
            Sequence::new(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
            Sequence::new(2, vec![5.0, 6.0]).unwrap(),
        ];

        let tensor = Tensor::from_sequences(&sequences, &Device::Cpu).unwrap();

        assert_eq!(tensor.dims(), &[2, 2, 2]);
        assert_eq!(
            tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]
        );
    }
}
