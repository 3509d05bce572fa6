//! Burn tensors carry their rank as a const generic, so only rank-3 float
//! tensors get an implementation.
use burn::prelude::{Backend as BurnBackend, Tensor};
use burn::tensor::TensorData;
use crate::error::{DispatchError, Result};
use super::SequenceTensor;

impl<B> SequenceTensor for Tensor<B, 3>
where B: BurnBackend
{
    type Device = B::Device;

    fn block_shape(&self) -> Result<[usize; 3]> {
        Ok(self.dims())
    }

    fn to_f32_vec(&self) -> Result<Vec<f32>> {
        self.to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| DispatchError::Shape(format!("{e:?}")))
    }

    fn from_f32_vec(values: Vec<f32>, shape: [usize; 3], device: &B::Device) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(DispatchError::Shape(format!(
                "{} values cannot fill a tensor of shape {shape:?}",
                values.len()
            )));
        }
        Ok(Tensor::from_data(TensorData::new(values, shape), device))
    }
}
