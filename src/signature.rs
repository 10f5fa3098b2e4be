use parking_lot::Mutex;

use crate::{
  internal::*,
  algebra::{ Algebra, signature_channels },
  parallel::{ self, Segments },
  tensor::Tensor,
  variable::{ Variable, MultiOp },
  scalar::Real,
  error::{ Result, SigError },
};


/// Where a path starts before its first point.
///
/// A basepoint adds one increment in front of the path, from the basepoint
/// to the first point, which also adds one entry to streamed output.

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Basepoint<V> {
  #[default]
  None,
  /// The origin.
  Zero,
  /// An explicit point for each batch element, of shape `(batch, channels)`.
  Point(V),
}

impl<V> Basepoint<V> {
  pub fn is_some(&self) -> bool {
    !matches!(self, Self::None)
  }

  pub fn as_ref(&self) -> Basepoint<&V> {
    match self {
      Self::None => Basepoint::None,
      Self::Zero => Basepoint::Zero,
      Self::Point(point) => Basepoint::Point(point),
    }
  }

  pub fn map<O, F: FnOnce(V) -> O>(self, cb: F) -> Basepoint<O> {
    match self {
      Self::None => Basepoint::None,
      Self::Zero => Basepoint::Zero,
      Self::Point(point) => Basepoint::Point(cb(point)),
    }
  }
}


/// Validated description of a signature computation.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigSpec {
  pub batch: usize,
  pub length: usize,
  pub channels: usize,
  pub depth: usize,
  pub stream: bool,
  pub basepoint: bool,
  pub inverse: bool,
  pub initial: bool,
}

impl SigSpec {
  /// Check all arguments of a signature computation, naming the offending
  /// tensor on failure.

  pub fn validate<T: Real>(
    path: &Tensor<T>,
    depth: usize,
    basepoint: &Basepoint<Tensor<T>>,
    initial: Option<&Tensor<T>>,
    stream: bool,
    inverse: bool,
  ) -> Result<Self> {
    if depth < 1 {
      return Err(SigError::InvalidDepth(depth))
    }
    if path.rank() != 3 {
      return Err(SigError::InvalidRank { tensor: "path", expected: 3, found: path.dims().to_vec() })
    }
    if path.dims().iter().any(|&d| d == 0 ) {
      return Err(SigError::EmptyDimension { tensor: "path", found: path.dims().to_vec() })
    }
    let (batch, length, channels) = (path.dims()[0], path.dims()[1], path.dims()[2]);
    if !basepoint.is_some() && length < 2 {
      return Err(SigError::PathTooShort { required: 2, found: length })
    }
    if let Basepoint::Point(point) = basepoint {
      if point.dims() != [batch, channels] {
        return Err(SigError::ShapeMismatch {
          tensor: "basepoint",
          expected: vec![batch, channels],
          found: point.dims().to_vec(),
        })
      }
    }
    if let Some(initial) = initial {
      let expected = vec![batch, signature_channels(channels, depth)];
      if initial.dims() != expected {
        return Err(SigError::ShapeMismatch { tensor: "initial", expected, found: initial.dims().to_vec() })
      }
    }
    Ok(Self {
      batch,
      length,
      channels,
      depth,
      stream,
      basepoint: basepoint.is_some(),
      inverse,
      initial: initial.is_some(),
    })
  }

  /// Number of increments, which is also the length of streamed output.

  pub fn increments(&self) -> usize {
    self.length - 1 + self.basepoint as usize
  }

  pub fn signature_channels(&self) -> usize {
    signature_channels(self.channels, self.depth)
  }

  pub fn output_dims(&self) -> Vec<usize> {
    if self.stream {
      vec![self.batch, self.increments(), self.signature_channels()]
    } else {
      vec![self.batch, self.signature_channels()]
    }
  }
}


/// How each batch element's product gets evaluated.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
  Sequential,
  Threaded { workers: usize },
}


/// State of a forward execution, needed to compute its gradients.
///
/// A record gets consumed by exactly one call to [backward].

#[derive(Debug)]
pub struct GradientRecord<T: Real> {
  spec: SigSpec,
  point: bool,
  increments: Vec<T>,
  output: Vec<T>,
  initial: Option<Vec<T>>,
  segments: Option<Vec<Segments<T>>>,
}

impl<T: Real> GradientRecord<T> {
  pub fn spec(&self) -> &SigSpec {
    &self.spec
  }
}


/// Gradients with respect to the inputs of a signature computation.
///
/// `basepoint` is only present for explicit basepoints,
/// `initial` only if an initial signature was given.

#[derive(Debug, Clone, PartialEq)]
pub struct Gradients<T: Real> {
  pub path: Tensor<T>,
  pub basepoint: Option<Tensor<T>>,
  pub initial: Option<Tensor<T>>,
}


/// Flat `(batch, increments, channels)` differences of consecutive points.

fn increments<T: Real>(path: &Tensor<T>, basepoint: &Basepoint<Tensor<T>>, spec: &SigSpec) -> Vec<T> {
  let (l, c) = (spec.length, spec.channels);
  let points = path.to_vec();
  let base = match basepoint {
    Basepoint::None => None,
    Basepoint::Zero => Some(vec![T::zero(); spec.batch * c]),
    Basepoint::Point(point) => Some(point.to_vec()),
  };
  let mut out = Vec::with_capacity(spec.batch * spec.increments() * c);
  for b in 0..spec.batch {
    let rows = &points[b * l * c .. (b + 1) * l * c];
    if let Some(base) = &base {
      out.extend(rows[..c].iter().zip(&base[b * c .. (b + 1) * c]).map(|(&p, &q)| p - q ));
    }
    for i in 1..l {
      out.extend(rows[i * c .. (i + 1) * c].iter().zip(&rows[(i - 1) * c .. i * c]).map(|(&p, &q)| p - q ));
    }
  }
  out
}


/// Adjoint of [increments], returning gradients for path and basepoint.

fn scatter_increments<T: Real>(grad: &[T], spec: &SigSpec, point: bool) -> (Vec<T>, Option<Vec<T>>) {
  let (l, c, n) = (spec.length, spec.channels, spec.increments());
  let mut grad_path = vec![T::zero(); spec.batch * l * c];
  let mut grad_base = point.then(|| vec![T::zero(); spec.batch * c] );
  let shift = spec.basepoint as usize;
  for b in 0..spec.batch {
    let g = &grad[b * n * c .. (b + 1) * n * c];
    let rows = &mut grad_path[b * l * c .. (b + 1) * l * c];
    if spec.basepoint {
      for j in 0..c {
        rows[j] += g[j];
      }
      if let Some(base) = grad_base.as_mut() {
        for j in 0..c {
          base[b * c + j] -= g[j];
        }
      }
    }
    for i in 1..l {
      let k = i - 1 + shift;
      for j in 0..c {
        rows[i * c + j] += g[k * c + j];
        rows[(i - 1) * c + j] -= g[k * c + j];
      }
    }
  }
  (grad_path, grad_base)
}


/// Run Chen's recursion over flat increments, starting from `start`
/// or the identity, and return the final product.
///
/// Inverted runs multiply `exp(-increment)` from the left instead.
/// With `stream` given, every intermediate product is written into it.

pub(crate) fn chain_forward<T: Real>(
  algebra: &Algebra,
  increments: &[T],
  start: Option<&[T]>,
  inverse: bool,
  mut stream: Option<&mut [T]>,
) -> Vec<T> {
  let (c, size) = (algebra.channels(), algebra.size());
  let mut acc = start.map(|s| s.to_vec() ).unwrap_or_else(|| vec![T::zero(); size] );
  let mut step = vec![T::zero(); size];
  let mut z = vec![T::zero(); c];
  for (k, increment) in increments.chunks(c).enumerate() {
    if inverse {
      for (zi, &d) in z.iter_mut().zip(increment) {
        *zi = -d;
      }
      algebra.exp(&z, &mut step);
      algebra.mult_left(&step, &mut acc);
    } else {
      algebra.exp(increment, &mut step);
      algebra.mult(&mut acc, &step);
    }
    if let Some(out) = stream.as_deref_mut() {
      out[k * size .. (k + 1) * size].copy_from_slice(&acc);
    }
  }
  acc
}


/// Gradient of [chain_forward].
///
/// Without `stream`, `outputs` holds the final product only and every
/// earlier product is recovered by multiplying with `exp(-z)` again.
/// Gradients of the increments accumulate into `grad_increments`;
/// the gradient of the starting value is returned.

pub(crate) fn chain_backward<T: Real>(
  algebra: &Algebra,
  increments: &[T],
  start: Option<&[T]>,
  inverse: bool,
  outputs: &[T],
  stream: bool,
  grad_outputs: &[T],
  grad_increments: &mut [T],
) -> Vec<T> {
  let (c, size) = (algebra.channels(), algebra.size());
  let n = increments.len() / c;
  let zeros = vec![T::zero(); size];
  let mut g = if stream { zeros.clone() } else { grad_outputs.to_vec() };
  let mut current = if stream { zeros.clone() } else { outputs.to_vec() };
  let mut previous = zeros.clone();
  let mut step = zeros.clone();
  let mut undo = zeros.clone();
  let mut z = vec![T::zero(); c];
  let mut neg_z = vec![T::zero(); c];
  for k in (0..n).rev() {
    let increment = &increments[k * c .. (k + 1) * c];
    for ((zi, ni), &d) in z.iter_mut().zip(neg_z.iter_mut()).zip(increment) {
      *zi = if inverse { -d } else { d };
      *ni = -*zi;
    }
    algebra.exp(&z, &mut step);
    if stream {
      for (gi, &o) in g.iter_mut().zip(&grad_outputs[k * size .. (k + 1) * size]) {
        *gi += o;
      }
    }
    // Product before this step
    if k == 0 {
      previous.copy_from_slice(start.unwrap_or(&zeros));
    } else if stream {
      previous.copy_from_slice(&outputs[(k - 1) * size .. k * size]);
    } else {
      algebra.exp(&neg_z, &mut undo);
      previous.copy_from_slice(&current);
      if inverse {
        algebra.mult_left(&undo, &mut previous);
      } else {
        algebra.mult(&mut previous, &undo);
      }
    }
    let mut grad_previous = zeros.clone();
    let mut grad_step = zeros.clone();
    if inverse {
      algebra.mult_backward(&step, &previous, &g, &mut grad_step, &mut grad_previous);
    } else {
      algebra.mult_backward(&previous, &step, &g, &mut grad_previous, &mut grad_step);
    }
    let mut grad_z = vec![T::zero(); c];
    algebra.exp_backward(&z, &step, &grad_step, &mut grad_z);
    for (out, &gz) in grad_increments[k * c .. (k + 1) * c].iter_mut().zip(&grad_z) {
      *out += if inverse { -gz } else { gz };
    }
    g = grad_previous;
    std::mem::swap(&mut current, &mut previous);
  }
  g
}


/// Signature of a batch of paths, together with the record needed for
/// its gradients.
///
/// `path` has shape `(batch, length, channels)`. The result has shape
/// `(batch, signature_channels)`, or `(batch, increments, signature_channels)`
/// when streaming, entry `i` holding the signature up to point `i + 1`
/// (point `i` with a basepoint). When inverted, the group inverse of each
/// of those is returned instead. An `initial` signature is composed with
/// the result, from the left or, when inverted, from the right.

pub fn compute<T: Real>(
  path: &Tensor<T>,
  depth: usize,
  basepoint: &Basepoint<Tensor<T>>,
  initial: Option<&Tensor<T>>,
  stream: bool,
  inverse: bool,
) -> Result<(Tensor<T>, GradientRecord<T>)> {
  compute_with(path, depth, basepoint, initial, stream, inverse, Kernel::Sequential)
}

pub(crate) fn compute_with<T: Real>(
  path: &Tensor<T>,
  depth: usize,
  basepoint: &Basepoint<Tensor<T>>,
  initial: Option<&Tensor<T>>,
  stream: bool,
  inverse: bool,
  kernel: Kernel,
) -> Result<(Tensor<T>, GradientRecord<T>)> {
  let spec = SigSpec::validate(path, depth, basepoint, initial, stream, inverse)?;
  tracing::debug!(
    batch = spec.batch, length = spec.length, channels = spec.channels,
    depth, stream, inverse, ?kernel,
    "signature forward"
  );
  let algebra = Algebra::new(spec.channels, depth);
  let (c, n, size) = (spec.channels, spec.increments(), algebra.size());
  let increments = increments(path, basepoint, &spec);
  let initial = initial.map(|initial| initial.to_vec() );
  let results = batch_map(spec.batch, |b| {
    let element = &increments[b * n * c .. (b + 1) * n * c];
    let start = initial.as_ref().map(|initial| &initial[b * size .. (b + 1) * size] );
    match kernel {
      Kernel::Threaded { workers } if !stream && workers > 1 => {
        let (out, segments) = parallel::segmented_forward(&algebra, element, start, inverse, workers);
        (out, Some(segments))
      },
      _ => if stream {
        let mut out = vec![T::zero(); n * size];
        chain_forward(&algebra, element, start, inverse, Some(&mut out));
        (out, None)
      } else {
        (chain_forward(&algebra, element, start, inverse, None), None)
      },
    }
  });
  let (outputs, segments): (Vec<Vec<T>>, Vec<Option<Segments<T>>>) = results.into_iter().unzip();
  let output: Vec<T> = outputs.concat();
  let result = Tensor::new(&spec.output_dims(), output.clone());
  let record = GradientRecord {
    point: matches!(basepoint, Basepoint::Point(_)),
    segments: segments.into_iter().collect(),
    spec,
    increments,
    output,
    initial,
  };
  Ok((result, record))
}


/// Gradients of a signature computation's inputs, given the gradient
/// of some quantity with respect to its output.

pub fn backward<T: Real>(grad: &Tensor<T>, record: GradientRecord<T>) -> Result<Gradients<T>> {
  let spec = &record.spec;
  let expected = spec.output_dims();
  if grad.dims() != expected {
    return Err(SigError::GradientShape { expected, found: grad.dims().to_vec() })
  }
  tracing::debug!(batch = spec.batch, segmented = record.segments.is_some(), "signature backward");
  let algebra = Algebra::new(spec.channels, spec.depth);
  let (c, n, size) = (spec.channels, spec.increments(), algebra.size());
  let rows = if spec.stream { n } else { 1 };
  let grad = grad.to_vec();
  let results = batch_map(spec.batch, |b| {
    let element = &record.increments[b * n * c .. (b + 1) * n * c];
    let start = record.initial.as_ref().map(|initial| &initial[b * size .. (b + 1) * size] );
    let grad_output = &grad[b * rows * size .. (b + 1) * rows * size];
    let mut grad_increments = vec![T::zero(); n * c];
    let grad_start = match &record.segments {
      Some(segments) => parallel::segmented_backward(
        &algebra, element, spec.inverse, &segments[b], grad_output, &mut grad_increments,
      ),
      None => chain_backward(
        &algebra, element, start, spec.inverse,
        &record.output[b * rows * size .. (b + 1) * rows * size], spec.stream,
        grad_output, &mut grad_increments,
      ),
    };
    (grad_increments, grad_start)
  });
  let (grad_increments, grad_initial): (Vec<Vec<T>>, Vec<Vec<T>>) = results.into_iter().unzip();
  let (grad_path, grad_base) = scatter_increments(&grad_increments.concat(), spec, record.point);
  Ok(Gradients {
    path: Tensor::new(&[spec.batch, spec.length, c], grad_path),
    basepoint: grad_base.map(|g| Tensor::new(&[spec.batch, c], g) ),
    initial: spec.initial.then(|| Tensor::new(&[spec.batch, size], grad_initial.concat()) ),
  })
}


/// Differentiable signature operation for the computation graph.
///
/// Its inputs are the path, followed by the basepoint if it is an
/// explicit point and the initial signature if there is one.

#[derive(Debug)]
pub(crate) struct SignatureOp<T: Real> {
  depth: usize,
  stream: bool,
  inverse: bool,
  basepoint: Basepoint<()>,
  initial: bool,
  kernel: Kernel,
  record: Mutex<Option<GradientRecord<T>>>,
}

impl<T: Real> MultiOp<T> for SignatureOp<T> {
  fn run(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
    let basepoint = self.basepoint.as_ref().map(|_| inputs[1].clone() );
    let initial = self.initial.then(|| inputs[inputs.len() - 1] );
    let (out, record) = compute_with(inputs[0], self.depth, &basepoint, initial, self.stream, self.inverse, self.kernel)?;
    *self.record.lock() = Some(record);
    Ok(out)
  }

  fn derive(&self, _inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Result<Vec<Tensor<T>>> {
    let record = self.record.lock().take().ok_or(SigError::MissingRecord)?;
    let grads = backward(grad, record)?;
    let mut out = vec![grads.path];
    out.extend(grads.basepoint);
    out.extend(grads.initial);
    Ok(out)
  }
}


/// Signature of a path [Variable], recorded in its computation graph.

pub(crate) fn signature_op<T: Real>(
  path: &Variable<T>,
  depth: usize,
  basepoint: &Basepoint<Variable<T>>,
  initial: Option<&Variable<T>>,
  stream: bool,
  inverse: bool,
  kernel: Kernel,
) -> Result<Variable<T>> {
  let mut inputs = vec![path];
  if let Basepoint::Point(point) = basepoint {
    inputs.push(point);
  }
  inputs.extend(initial);
  let op = SignatureOp {
    depth,
    stream,
    inverse,
    basepoint: basepoint.as_ref().map(|_| () ),
    initial: initial.is_some(),
    kernel,
    record: Mutex::new(None),
  };
  Variable::multi_op(op, &inputs)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::{ BaseOps, NumericOps };

  fn path() -> Tensor<f64> {
    Tensor::new(&[2,4,2], vec![
      0.0, 0.0, 1.0, 0.5, 1.5, 2.0, 0.5, 2.5,
      1.0, -1.0, 0.0, 0.0, -0.5, 1.0, 2.0, 1.5,
    ])
  }

  #[test]
  fn validation() {
    let path = path();
    assert_eq!(SigSpec::validate(&path, 0, &Basepoint::None, None, false, false), Err(SigError::InvalidDepth(0)));
    let flat = Tensor::<f64>::zeros(&[4,2]);
    assert!(matches!(SigSpec::validate(&flat, 2, &Basepoint::None, None, false, false),
      Err(SigError::InvalidRank { tensor: "path", .. })));
    let empty = Tensor::<f64>::zeros(&[2,0,2]);
    assert!(matches!(SigSpec::validate(&empty, 2, &Basepoint::None, None, false, false),
      Err(SigError::EmptyDimension { .. })));
    let single = Tensor::<f64>::zeros(&[2,1,2]);
    assert_eq!(SigSpec::validate(&single, 2, &Basepoint::None, None, false, false),
      Err(SigError::PathTooShort { required: 2, found: 1 }));
    assert!(SigSpec::validate(&single, 2, &Basepoint::Zero, None, false, false).is_ok());
    let bad_point = Basepoint::Point(Tensor::zeros(&[2,3]));
    assert!(matches!(SigSpec::validate(&path, 2, &bad_point, None, false, false),
      Err(SigError::ShapeMismatch { tensor: "basepoint", .. })));
    let bad_initial = Tensor::zeros(&[2,5]);
    assert!(matches!(SigSpec::validate(&path, 2, &Basepoint::None, Some(&bad_initial), false, false),
      Err(SigError::ShapeMismatch { tensor: "initial", .. })));
  }

  #[test]
  fn output_dims() {
    let spec = SigSpec::validate(&path(), 3, &Basepoint::Zero, None, true, false).unwrap();
    assert_eq!(spec.increments(), 4);
    assert_eq!(spec.output_dims(), vec![2, 4, 14]);
  }

  #[test]
  fn single_segment() {
    // The signature of a straight line is the exponential of its increment
    let line = Tensor::new(&[1,2,2], vec![1.0, 1.0, 3.0, 0.0]);
    let (sig, _) = compute(&line, 2, &Basepoint::None, None, false, false).unwrap();
    assert!(sig.allclose(&Tensor::new(&[1,6], vec![2.0, -1.0, 2.0, -1.0, -1.0, 0.5])));
  }

  #[test]
  fn basepoint_adds_increment() {
    let path = path();
    let (without, _) = compute(&path, 2, &Basepoint::None, None, false, false).unwrap();
    // Starting at the first point adds a zero increment
    let first = path.narrow(1, 0, 1).reshape(&[2,2]);
    let (same, _) = compute(&path, 2, &Basepoint::Point(first), None, true, false).unwrap();
    assert_eq!(same.dims(), &[2,4,6]);
    assert!(same.at(&[0,0]).allclose(&Tensor::zeros(&[6])));
    assert!(same.narrow(1, 3, 1).reshape(&[2,6]).allclose(&without));
    let (zero, _) = compute(&path, 2, &Basepoint::Zero, None, false, false).unwrap();
    assert!(!zero.allclose(&without));
  }

  #[test]
  fn record_is_consumed() {
    let (sig, record) = compute(&path(), 2, &Basepoint::None, None, false, false).unwrap();
    let bad = Tensor::ones(&[2,5]);
    assert!(matches!(backward(&bad, record), Err(SigError::GradientShape { .. })));
    let (_, record) = compute(&path(), 2, &Basepoint::None, None, false, false).unwrap();
    let grads = backward(&Tensor::ones(sig.dims()), record).unwrap();
    assert_eq!(grads.path.dims(), &[2,4,2]);
    assert!(grads.basepoint.is_none());
    assert!(grads.initial.is_none());
  }

  #[test]
  fn op_needs_record() {
    let x = path().trained();
    let y = signature_op(&x, 2, &Basepoint::None, None, false, false, Kernel::Sequential).unwrap().sum();
    y.backward().unwrap();
    assert_eq!(y.backward(), Err(SigError::MissingRecord));
  }

  #[test]
  fn gradients() {
    for &(stream, inverse) in &[(false, false), (true, false), (false, true), (true, true)] {
      let basepoint = Tensor::new(&[2,2], vec![0.5, -0.5, 1.0, 0.0]).trained();
      let initial = Tensor::new(&[2,6], vec![
        0.1, 0.2, 0.3, -0.1, 0.2, 0.05,
        -0.2, 0.4, 0.0, 0.1, -0.3, 0.2,
      ]).trained();
      let diff = Variable::check_gradients(&path(), |x| {
        signature_op(x, 2, &Basepoint::Point(basepoint.clone()), Some(&initial), stream, inverse, Kernel::Sequential)
      }).unwrap();
      assert!(diff < 1e-6, "stream {stream} inverse {inverse}: {diff}");
    }
  }
}
