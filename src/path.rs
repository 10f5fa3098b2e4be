use std::ops::{ Bound, RangeBounds };
use std::sync::Arc;

use crate::{
  algebra::signature_channels,
  combine::signature_combine,
  config::SigOptions,
  engine::Engine,
  logsignature::{ LogSignatureMode, logsignature_dim },
  signature::Basepoint,
  tensor::Tensor,
  variable::Variable,
  scalar::Real,
  ops::BaseOps,
  error::{ Result, SigError },
};


/// A batch of paths that answers signature queries over any interval
/// of its points.
///
/// The streamed signature and the streamed inverse signature get computed
/// once, after which the signature of `[start, end)` is a single product
/// of two stored entries. New points may be appended with [Path::update].
///
/// Interval indices refer to the points that were passed in. If the path
/// has a basepoint, an interval with an unbounded start begins at the
/// basepoint.
///
/// Query results are part of the computation graph. Since the stored
/// streams each keep a single gradient record, gradients flow back through
/// them during one backward pass only.
///
/// ```
/// use microsig::{ Path, Basepoint, Tensor };
///
/// let points = Tensor::<f64>::randn(&[2, 20, 3]).tracked();
/// let path = Path::new(&points, 3, &Basepoint::None).unwrap();
/// let sig = path.signature(4..12).unwrap();
/// assert_eq!(sig.dims(), &[2, 39]);
/// ```

#[derive(Debug, Clone)]
pub struct Path<T: Real> {
  engine: Arc<Engine>,
  depth: usize,
  basepoint: bool,
  points: Variable<T>,
  signatures: Variable<T>,
  inverse_signatures: Variable<T>,
}

impl<T: Real> Path<T> {
  pub fn new(points: &Variable<T>, depth: usize, basepoint: &Basepoint<Variable<T>>) -> Result<Self> {
    Self::with_engine(Arc::new(Engine::default()), points, depth, basepoint)
  }

  pub fn with_engine(
    engine: Arc<Engine>,
    points: &Variable<T>,
    depth: usize,
    basepoint: &Basepoint<Variable<T>>,
  ) -> Result<Self> {
    let options = SigOptions { basepoint: basepoint.clone(), stream: true, ..SigOptions::default() };
    let signatures = engine.signature(points, depth, &options)?;
    let inverse_signatures = engine.signature(points, depth, &options.clone().inverse(true))?;
    let (batch, channels) = (points.dims()[0], points.dims()[2]);
    let points = match basepoint {
      Basepoint::None => points.clone(),
      Basepoint::Zero => Tensor::zeros(&[batch, 1, channels]).tracked().concat(points, 1),
      Basepoint::Point(point) => point.reshape(&[batch, 1, channels]).concat(points, 1),
    };
    Ok(Self {
      engine,
      depth,
      basepoint: basepoint.is_some(),
      points,
      signatures,
      inverse_signatures,
    })
  }

  pub fn batch(&self) -> usize {
    self.points.dims()[0]
  }

  /// Number of points, not counting the basepoint.

  pub fn len(&self) -> usize {
    self.points.dims()[1] - self.basepoint as usize
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn channels(&self) -> usize {
    self.points.dims()[2]
  }

  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn signature_channels(&self) -> usize {
    signature_channels(self.channels(), self.depth)
  }

  pub fn logsignature_channels(&self, mode: LogSignatureMode) -> usize {
    logsignature_dim(self.channels(), self.depth, mode)
  }

  /// All points, including the basepoint.

  pub fn points(&self) -> &Variable<T> {
    &self.points
  }

  // Resolve an interval to stored point indices
  fn locate(&self, range: impl RangeBounds<usize>) -> Result<(usize, usize)> {
    let (shift, stored) = (self.basepoint as usize, self.points.dims()[1]);
    let start = match range.start_bound() {
      Bound::Included(&s) => s.checked_add(shift),
      Bound::Excluded(&s) => s.checked_add(1 + shift),
      Bound::Unbounded => Some(0),
    };
    let end = match range.end_bound() {
      Bound::Included(&e) => e.checked_add(1 + shift),
      Bound::Excluded(&e) => e.checked_add(shift),
      Bound::Unbounded => Some(stored),
    };
    match (start, end) {
      (Some(start), Some(end)) if end <= stored && start.saturating_add(2) <= end => Ok((start, end)),
      _ => Err(SigError::InvalidInterval {
        start: start.unwrap_or(usize::MAX).saturating_sub(shift),
        end: end.unwrap_or(usize::MAX).saturating_sub(shift),
        length: self.len(),
      }),
    }
  }

  /// Signature of the points in `range`, which must span at least
  /// one increment.

  pub fn signature(&self, range: impl RangeBounds<usize>) -> Result<Variable<T>> {
    let (start, end) = self.locate(range)?;
    let (batch, sigdim) = (self.batch(), self.signature_channels());
    let head = self.signatures.narrow(1, end - 2, 1).reshape(&[batch, sigdim]);
    if start == 0 {
      return Ok(head)
    }
    let tail = self.inverse_signatures.narrow(1, start - 1, 1).reshape(&[batch, sigdim]);
    signature_combine(&tail, &head, self.channels(), self.depth, false)
  }

  /// Log-signature of the points in `range`.

  pub fn logsignature(&self, range: impl RangeBounds<usize>, mode: LogSignatureMode) -> Result<Variable<T>> {
    let signature = self.signature(range)?;
    self.engine.signature_to_logsignature(&signature, self.channels(), self.depth, mode, false)
  }

  /// Append points of shape `(batch, count, channels)`.

  pub fn update(&mut self, points: &Variable<T>) -> Result<()> {
    let (batch, length, channels) = (self.batch(), self.points.dims()[1], self.channels());
    if points.rank() != 3 || points.dims()[0] != batch || points.dims()[2] != channels {
      return Err(SigError::ShapeMismatch {
        tensor: "path",
        expected: vec![batch, points.dims().get(1).copied().unwrap_or(0), channels],
        found: points.dims().to_vec(),
      })
    }
    let sigdim = self.signature_channels();
    let last = |stream: &Variable<T>| stream.narrow(1, length - 2, 1).reshape(&[batch, sigdim]);
    let options = SigOptions::new()
      .basepoint(&self.points.narrow(1, length - 1, 1).reshape(&[batch, channels]))
      .stream(true);
    let signatures = self.engine.signature(points, self.depth, &options.clone().initial(&last(&self.signatures)))?;
    let inverse_signatures = self.engine.signature(
      points,
      self.depth,
      &options.initial(&last(&self.inverse_signatures)).inverse(true),
    )?;
    tracing::debug!(batch, added = points.dims()[1], "path extended");
    self.signatures = self.signatures.concat(&signatures, 1);
    self.inverse_signatures = self.inverse_signatures.concat(&inverse_signatures, 1);
    self.points = self.points.concat(points, 1);
    Ok(())
  }
}
