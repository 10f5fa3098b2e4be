use std::sync::Arc;

use serde::{ Serialize, Deserialize };

use crate::{
  internal::*,
  algebra::{ Algebra, signature_channels },
  lyndon::{ LyndonBasis, BasisCache, logsignature_channels },
  tensor::Tensor,
  variable::{ Variable, UnaryOp },
  scalar::Real,
  error::{ Result, SigError },
};


/// Encoding of a log-signature.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSignatureMode {
  /// Coefficients of the logarithm at the Lyndon words, without a change
  /// of Lie basis. Agrees with [LogSignatureMode::Brackets] at small depths.
  #[default]
  Words,
  /// The full tensor logarithm, of the same size as the signature.
  Expand,
  /// Coordinates in the Lyndon bracket basis of the free Lie algebra.
  Brackets,
}


/// Size of the last dimension of a log-signature in the given mode.

pub fn logsignature_dim(channels: usize, depth: usize, mode: LogSignatureMode) -> usize {
  match mode {
    LogSignatureMode::Expand => signature_channels(channels, depth),
    _ => logsignature_channels(channels, depth),
  }
}


#[derive(Debug, Clone)]
struct LogSignatureOp {
  algebra: Algebra,
  mode: LogSignatureMode,
  basis: Option<Arc<LyndonBasis>>,
}

impl LogSignatureOp {
  fn width(&self) -> usize {
    match &self.basis {
      Some(basis) => basis.size(),
      None => self.algebra.size(),
    }
  }
}

impl<T: Real> UnaryOp<T> for LogSignatureOp {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    let (size, width) = (self.algebra.size(), self.width());
    let data = lhs.to_vec();
    let rows = batch_map(data.len() / size, |r| {
      let mut log = vec![T::zero(); size];
      self.algebra.log(&data[r * size .. (r + 1) * size], &mut log);
      match &self.basis {
        Some(basis) => {
          let mut out = vec![T::zero(); width];
          basis.gather(&log, &mut out);
          if self.mode == LogSignatureMode::Brackets {
            basis.to_brackets(&mut out);
          }
          out
        },
        None => log,
      }
    });
    let mut dims = lhs.dims().to_vec();
    if let Some(last) = dims.last_mut() {
      *last = width;
    }
    Tensor::new(&dims, rows.concat())
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let (size, width) = (self.algebra.size(), self.width());
    let (data, grad) = (lhs.to_vec(), grad.to_vec());
    let rows = batch_map(data.len() / size, |r| {
      let grad_log = match &self.basis {
        Some(basis) => {
          let mut g = grad[r * width .. (r + 1) * width].to_vec();
          if self.mode == LogSignatureMode::Brackets {
            basis.to_brackets_backward(&mut g);
          }
          let mut scattered = vec![T::zero(); size];
          basis.scatter_add(&g, &mut scattered);
          scattered
        },
        None => grad[r * size .. (r + 1) * size].to_vec(),
      };
      let mut out = vec![T::zero(); size];
      self.algebra.log_backward(&data[r * size .. (r + 1) * size], &grad_log, &mut out);
      out
    });
    Tensor::new(lhs.dims(), rows.concat())
  }
}


/// Log-signature from a signature of shape `(batch, signature_channels)`,
/// or `(batch, stream, signature_channels)` when streaming.
///
/// Bases for the Lyndon modes are taken from `bases`, which builds them
/// on first use.

pub fn signature_to_logsignature<T: Real>(
  signature: &Variable<T>,
  channels: usize,
  depth: usize,
  mode: LogSignatureMode,
  stream: bool,
  bases: &BasisCache,
) -> Result<Variable<T>> {
  if depth < 1 {
    return Err(SigError::InvalidDepth(depth))
  }
  if channels < 1 {
    return Err(SigError::EmptyDimension { tensor: "signature", found: signature.dims().to_vec() })
  }
  if mode == LogSignatureMode::Brackets && channels == 1 {
    return Err(SigError::ModeUnsupported { mode, channels })
  }
  let rank = if stream { 3 } else { 2 };
  if signature.rank() != rank {
    return Err(SigError::InvalidRank { tensor: "signature", expected: rank, found: signature.dims().to_vec() })
  }
  let sigdim = signature_channels(channels, depth);
  if signature.dims()[rank - 1] != sigdim {
    let mut expected = signature.dims().to_vec();
    expected[rank - 1] = sigdim;
    return Err(SigError::ShapeMismatch { tensor: "signature", expected, found: signature.dims().to_vec() })
  }
  tracing::debug!(channels, depth, ?mode, stream, "log-signature");
  let basis = match mode {
    LogSignatureMode::Expand => None,
    _ => Some(bases.get(channels, depth)),
  };
  Ok(signature.unary_op(LogSignatureOp { algebra: Algebra::new(channels, depth), mode, basis }))
}
