//! BatchNormalization folding
//!
//! Pure numerics, no graph access: a fusion computes the folded weight
//! and bias here and only touches the graph once this has succeeded.
//!
//! With `s = γ / √(σ² + ε)` per output channel:
//!
//! ```text
//! W' = W · s      (along the output-channel axis)
//! b' = b · s + (β − μ · s)
//! ```
//!
//! All arithmetic runs in f64; results are narrowed back to the weight's
//! element type at the end.

use ndarray::{Array1, Dimension};

use crate::error::{OnnxResult, TransformError};
use crate::tensor::Constant;

/// Where the output channel lives in a weight tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// `Conv`: `(C_out, C_in / groups, k...)`
    OutputFirst,
    /// `ConvTranspose`: `(C_in, C_out / groups, k...)`
    Transposed {
        /// Channel groups; output channel `c` of group `g` is `g * (C_out / groups) + c`
        groups: usize,
    },
}

impl ChannelLayout {
    /// Output channels implied by a weight shape
    fn out_channels(&self, shape: &[usize]) -> OnnxResult<usize> {
        match *self {
            Self::OutputFirst => Ok(shape[0]),
            Self::Transposed { groups } => {
                if groups == 0 || shape[0] % groups != 0 {
                    return Err(TransformError::ShapeMismatch(format!(
                        "{} input channels cannot be split into {} groups",
                        shape[0], groups
                    )));
                }
                Ok(shape[1] * groups)
            }
        }
    }

    /// Output channel of the weight element at `idx`
    fn channel(&self, idx: &[usize], shape: &[usize]) -> usize {
        match *self {
            Self::OutputFirst => idx[0],
            Self::Transposed { groups } => {
                let in_per_group = shape[0] / groups;
                (idx[0] / in_per_group) * shape[1] + idx[1]
            }
        }
    }
}

/// Per-channel BatchNormalization constants
#[derive(Debug, Clone)]
pub struct BatchNormParams {
    /// γ
    pub gamma: Array1<f64>,
    /// β
    pub beta: Array1<f64>,
    /// Running mean μ
    pub mean: Array1<f64>,
    /// Running variance σ²
    pub var: Array1<f64>,
    /// ε
    pub epsilon: f64,
}

impl BatchNormParams {
    /// Collect the four parameter tensors, which must all have one value
    /// per channel
    pub fn from_constants(
        gamma: &Constant,
        beta: &Constant,
        mean: &Constant,
        var: &Constant,
        epsilon: f32,
    ) -> OnnxResult<Self> {
        let flat = |c: &Constant| c.to_f64().iter().copied().collect::<Array1<f64>>();
        let params = Self {
            gamma: flat(gamma),
            beta: flat(beta),
            mean: flat(mean),
            var: flat(var),
            epsilon: f64::from(epsilon),
        };
        let n = params.channels();
        for (name, len) in [
            ("bias", params.beta.len()),
            ("mean", params.mean.len()),
            ("var", params.var.len()),
        ] {
            if len != n {
                return Err(TransformError::ShapeMismatch(format!(
                    "BatchNormalization {} has {} values, scale has {}",
                    name, len, n
                )));
            }
        }
        Ok(params)
    }

    /// Number of normalized channels
    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    /// `γ / √(σ² + ε)`
    pub fn scale(&self) -> Array1<f64> {
        let eps = self.epsilon;
        &self.gamma / &self.var.mapv(|v| (v + eps).sqrt())
    }
}

/// Folded replacement constants
#[derive(Debug, Clone, PartialEq)]
pub struct FoldedParams {
    /// Weight with the normalization scale applied
    pub weight: Constant,
    /// Bias of length `C_out`, always present
    pub bias: Constant,
}

/// Fold a BatchNormalization into the preceding layer's weight and bias.
///
/// Fails with `ShapeMismatch` when the weight rank is below 2, the
/// normalization does not have one value per output channel, or the bias
/// length differs from the output channel count.
pub fn fold_batch_norm(
    weight: &Constant,
    bias: Option<&Constant>,
    bn: &BatchNormParams,
    layout: ChannelLayout,
) -> OnnxResult<FoldedParams> {
    let shape = weight.shape().to_vec();
    if shape.len() < 2 {
        return Err(TransformError::ShapeMismatch(format!(
            "weight of rank {} has no channel axes",
            shape.len()
        )));
    }
    let out_channels = layout.out_channels(&shape)?;
    if bn.channels() != out_channels {
        return Err(TransformError::ShapeMismatch(format!(
            "scale has {} channels, weight {:?} has {} output channels",
            bn.channels(),
            shape,
            out_channels
        )));
    }

    let bias: Array1<f64> = match bias {
        Some(b) if b.len() != out_channels => {
            return Err(TransformError::ShapeMismatch(format!(
                "bias has {} values, expected {}",
                b.len(),
                out_channels
            )));
        }
        Some(b) => b.to_f64().iter().copied().collect(),
        None => Array1::zeros(out_channels),
    };

    let scale = bn.scale();
    let mut w = weight.to_f64();
    for (idx, v) in w.indexed_iter_mut() {
        *v *= scale[layout.channel(idx.slice(), &shape)];
    }
    let shift = &bn.beta - &(&bn.mean * &scale);
    let folded_bias = &bias * &scale + &shift;

    let dtype = weight.data_type();
    Ok(FoldedParams {
        weight: Constant::from_f64(dtype, w)?,
        bias: Constant::from_f64(dtype, folded_bias.into_dyn())?,
    })
}

/// Apply a BatchNormalization to channel-first activations `(C, ...)`
#[cfg(test)]
pub(crate) fn batch_norm_reference(
    x: &ndarray::ArrayD<f64>,
    bn: &BatchNormParams,
) -> ndarray::ArrayD<f64> {
    let mut y = x.clone();
    for (idx, v) in y.indexed_iter_mut() {
        let c = idx[0];
        *v = bn.gamma[c] * (*v - bn.mean[c]) / (bn.var[c] + bn.epsilon).sqrt() + bn.beta[c];
    }
    y
}
