//! `candle` adapter.

use crate::error::Result;
use candle_core::{Device, Tensor, WithDType};
use ndarray::{ArrayD, IxDyn};

/// Copy an ndarray into a candle tensor of the same shape.
pub fn to_tensor<T: WithDType>(array: &ArrayD<T>, device: &Device) -> Result<Tensor> {
    let shape = array.shape().to_vec();
    let data: Vec<T> = array.iter().copied().collect();
    Ok(Tensor::from_vec(data, shape, device)?)
}

/// Copy a candle tensor back into an ndarray.
pub fn from_tensor<T: WithDType>(tensor: &Tensor) -> Result<ArrayD<T>> {
    let shape = tensor.dims().to_vec();
    let data = tensor.flatten_all()?.to_vec1::<T>()?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}
