use thiserror::Error;

use crate::logsignature::LogSignatureMode;


/// Faults raised by signature computations.
///
/// All of them are detected synchronously, before any work is done on the
/// offending call.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigError {
  #[error("depth must be an integer greater than or equal to one, got {0}")]
  InvalidDepth(usize),

  #[error("'{tensor}' must be a {expected}-dimensional tensor, got shape {found:?}")]
  InvalidRank { tensor: &'static str, expected: usize, found: Vec<usize> },

  #[error("'{tensor}' cannot have dimensions of size zero, got shape {found:?}")]
  EmptyDimension { tensor: &'static str, found: Vec<usize> },

  #[error("path must have at least {required} points along its stream dimension, got {found}")]
  PathTooShort { required: usize, found: usize },

  #[error("'{tensor}' has shape {found:?} but {expected:?} was expected")]
  ShapeMismatch { tensor: &'static str, expected: Vec<usize>, found: Vec<usize> },

  #[error("log-signature mode {mode:?} is not defined for {channels} channel(s)")]
  ModeUnsupported { mode: LogSignatureMode, channels: usize },

  #[error("the batch-trick strategy cannot produce streamed output")]
  StreamingUnsupported,

  #[error("gradient has shape {found:?} but the forward pass produced {expected:?}")]
  GradientShape { expected: Vec<usize>, found: Vec<usize> },

  #[error("no forward record is available for this backward pass (it was never produced or already consumed)")]
  MissingRecord,

  #[error("cannot compute gradients for a constant")]
  NotDifferentiable,

  #[error("interval [{start}, {end}) is not valid for a path of {length} points")]
  InvalidInterval { start: usize, end: usize, length: usize },
}


pub type Result<T> = std::result::Result<T, SigError>;
