use std::ops::Range;

#[cfg(feature = "threading")]
use std::thread;

use crate::{
  algebra::Algebra,
  combine::multi_signature_combine,
  config::{ EngineConfig, Strategy },
  signature::{ self, Basepoint, SigSpec, Kernel, chain_forward, chain_backward },
  tensor::Tensor,
  variable::{ Variable, UnaryOp },
  scalar::Real,
  ops::BaseOps,
  error::Result,
};


/// Resolve [Strategy::Auto] for an input of the given shape.
///
/// Streams, short paths and batches that already occupy every worker
/// stay sequential. Otherwise long paths get split across threads,
/// or into an artificial batch when threading is compiled out.

pub fn choose(
  config: &EngineConfig,
  requested: Strategy,
  batch: usize,
  increments: usize,
  signature_channels: usize,
  stream: bool,
) -> Strategy {
  if requested != Strategy::Auto { return requested }
  let work = increments.saturating_mul(signature_channels);
  if stream || config.workers < 2 || batch >= config.workers || work < config.min_parallel_work {
    Strategy::Sequential
  } else if cfg!(feature = "threading") {
    Strategy::ThreadParallel
  } else {
    Strategy::BatchTrick
  }
}


/// Split `0..n` into at most `parts` contiguous, non-empty ranges
/// whose lengths differ by at most one.

pub fn split(n: usize, parts: usize) -> Vec<Range<usize>> {
  let parts = parts.clamp(1, n.max(1));
  let (base, extra) = (n / parts, n % parts);
  let mut start = 0;
  (0..parts)
    .map(|j| {
      let len = base + (j < extra) as usize;
      let range = start..start + len;
      start += len;
      range
    })
    .collect()
}


// Evaluate every index on its own scoped thread, keeping the order
fn run_all<R, F>(count: usize, cb: F) -> Vec<R>
where
  R: Send,
  F: Fn(usize) -> R + Sync,
{
  #[cfg(feature = "threading")]
  let out = if count < 2 {
    (0..count).map(&cb).collect()
  } else {
    thread::scope(|s| {
      let handles: Vec<_> = (0..count)
        .map(|j| {
          let cb = &cb;
          s.spawn(move || cb(j) )
        })
        .collect();
      handles.into_iter()
        .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e) ) )
        .collect()
    })
  };

  #[cfg(not(feature = "threading"))]
  let out = (0..count).map(cb).collect();

  out
}


/// Partial products of a segmented forward pass over one batch element.
///
/// `prefixes[j]` is the reduction of all segments before `j`,
/// including the initial value.

#[derive(Debug, Clone)]
pub(crate) struct Segments<T> {
  bounds: Vec<Range<usize>>,
  partials: Vec<Vec<T>>,
  prefixes: Vec<Vec<T>>,
}

/// Signature of one batch element, computed segment-wise on scoped threads
/// and reduced in fixed left to right order.

pub(crate) fn segmented_forward<T: Real>(
  algebra: &Algebra,
  increments: &[T],
  start: Option<&[T]>,
  inverse: bool,
  workers: usize,
) -> (Vec<T>, Segments<T>) {
  let c = algebra.channels();
  let bounds = split(increments.len() / c, workers);
  tracing::trace!(segments = bounds.len(), "segmented forward");
  let partials = run_all(bounds.len(), |j| {
    let range = &bounds[j];
    chain_forward(algebra, &increments[range.start * c .. range.end * c], None, inverse, None)
  });
  let mut acc = start.map(|s| s.to_vec() ).unwrap_or_else(|| vec![T::zero(); algebra.size()] );
  let mut prefixes = Vec::with_capacity(partials.len());
  for partial in &partials {
    prefixes.push(acc.clone());
    if inverse {
      algebra.mult_left(partial, &mut acc);
    } else {
      algebra.mult(&mut acc, partial);
    }
  }
  (acc, Segments { bounds, partials, prefixes })
}

/// Gradient of [segmented_forward]. Accumulates into `grad_increments`
/// and returns the gradient of the initial value.

pub(crate) fn segmented_backward<T: Real>(
  algebra: &Algebra,
  increments: &[T],
  inverse: bool,
  segments: &Segments<T>,
  grad_output: &[T],
  grad_increments: &mut [T],
) -> Vec<T> {
  let (c, size) = (algebra.channels(), algebra.size());
  let count = segments.partials.len();
  tracing::trace!(segments = count, "segmented backward");
  // Adjoint of the reduction
  let mut g = grad_output.to_vec();
  let mut grad_partials = vec![vec![T::zero(); size]; count];
  for j in (0..count).rev() {
    let mut grad_prefix = vec![T::zero(); size];
    if inverse {
      algebra.mult_backward(&segments.partials[j], &segments.prefixes[j], &g, &mut grad_partials[j], &mut grad_prefix);
    } else {
      algebra.mult_backward(&segments.prefixes[j], &segments.partials[j], &g, &mut grad_prefix, &mut grad_partials[j]);
    }
    g = grad_prefix;
  }
  // Segments are independent again
  let pieces = run_all(count, |j| {
    let range = &segments.bounds[j];
    let mut grad = vec![T::zero(); range.len() * c];
    chain_backward(
      algebra, &increments[range.start * c .. range.end * c], None, inverse,
      &segments.partials[j], false, &grad_partials[j], &mut grad,
    );
    grad
  });
  for (range, piece) in segments.bounds.iter().zip(pieces) {
    for (out, g) in grad_increments[range.start * c .. range.end * c].iter_mut().zip(piece) {
      *out += g;
    }
  }
  g
}


/// Cut `(batch, length, channels)` into `pieces` windows of `length + 1`
/// points each, neighbouring windows sharing one point. The result has shape
/// `(batch * pieces, length + 1, channels)`.

#[derive(Debug, Clone)]
struct Unfold {
  pieces: usize,
  length: usize,
}

impl<T: Real> UnaryOp<T> for Unfold {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    let (batch, l, c) = (lhs.dims()[0], lhs.dims()[1], lhs.dims()[2]);
    let window = (self.length + 1) * c;
    let data = lhs.to_vec();
    let mut out = Vec::with_capacity(batch * self.pieces * window);
    for b in 0..batch {
      for p in 0..self.pieces {
        let start = (b * l + p * self.length) * c;
        out.extend_from_slice(&data[start .. start + window]);
      }
    }
    Tensor::new(&[batch * self.pieces, self.length + 1, c], out)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let (batch, l, c) = (lhs.dims()[0], lhs.dims()[1], lhs.dims()[2]);
    let window = (self.length + 1) * c;
    let grad = grad.to_vec();
    let mut out = vec![T::zero(); batch * l * c];
    for b in 0..batch {
      for p in 0..self.pieces {
        let start = (b * l + p * self.length) * c;
        let source = (b * self.pieces + p) * window;
        for (o, &g) in out[start .. start + window].iter_mut().zip(&grad[source .. source + window]) {
          *o += g;
        }
      }
    }
    Tensor::new(lhs.dims(), out)
  }
}


/// Signature computed by treating overlapping pieces of each path as
/// an artificial batch and recombining the pieces' signatures.
///
/// Gradients flow through the computation graph.

pub(crate) fn batch_trick<T: Real>(
  path: &Variable<T>,
  depth: usize,
  basepoint: &Basepoint<Variable<T>>,
  initial: Option<&Variable<T>>,
  inverse: bool,
  chunks: usize,
) -> Result<Variable<T>> {
  let spec = SigSpec::validate(
    path.tensor(),
    depth,
    &basepoint.as_ref().map(|point| point.tensor().clone() ),
    initial.map(|initial| initial.tensor() ),
    false,
    inverse,
  )?;
  let (batch, channels, sigdim) = (spec.batch, spec.channels, spec.signature_channels());
  let full = match basepoint {
    Basepoint::None => path.clone(),
    Basepoint::Zero => Tensor::zeros(&[batch, 1, channels]).tracked().concat(path, 1),
    Basepoint::Point(point) => point.reshape(&[batch, 1, channels]).concat(path, 1),
  };
  let n = spec.increments();
  let pieces = chunks.clamp(1, n);
  let length = n / pieces;
  let covered = pieces * length;
  tracing::debug!(batch, pieces, length, remainder = n - covered, "batch trick");
  let windows = full.unary_op(Unfold { pieces, length });
  let mut sigs = signature::signature_op(&windows, depth, &Basepoint::None, None, false, inverse, Kernel::Sequential)?
    .reshape(&[batch, pieces, sigdim]);
  if covered < n {
    let rest = full.narrow(1, covered, n - covered + 1);
    let rest = signature::signature_op(&rest, depth, &Basepoint::None, None, false, inverse, Kernel::Sequential)?;
    sigs = sigs.concat(&rest.reshape(&[batch, 1, sigdim]), 1);
  }
  if let Some(initial) = initial {
    sigs = initial.reshape(&[batch, 1, sigdim]).concat(&sigs, 1);
  }
  multi_signature_combine(&sigs, channels, depth, inverse)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits() {
    assert_eq!(split(10, 3), vec![0..4, 4..7, 7..10]);
    assert_eq!(split(2, 4), vec![0..1, 1..2]);
    assert_eq!(split(5, 1), vec![0..5]);
  }

  #[test]
  fn auto() {
    let config = EngineConfig { workers: 4, min_parallel_work: 100, ..EngineConfig::default() };
    assert_eq!(choose(&config, Strategy::Auto, 1, 1000, 14, true), Strategy::Sequential);
    assert_eq!(choose(&config, Strategy::Auto, 1, 5, 14, false), Strategy::Sequential);
    assert_eq!(choose(&config, Strategy::Auto, 8, 1000, 14, false), Strategy::Sequential);
    let parallel = choose(&config, Strategy::Auto, 1, 1000, 14, false);
    assert_ne!(parallel, Strategy::Sequential);
    assert_ne!(parallel, Strategy::Auto);
    assert_eq!(choose(&config, Strategy::BatchTrick, 8, 1, 1, true), Strategy::BatchTrick);
  }

  #[test]
  fn segments_match_sequential() {
    let algebra = Algebra::new(2, 3);
    let increments: Vec<f64> = (0..14).map(|i| ((i * 5 % 7) as f64 - 3.0) * 0.2 ).collect();
    let start: Vec<f64> = (0..algebra.size()).map(|i| i as f64 * 0.01 ).collect();
    for &inverse in &[false, true] {
      let expected = chain_forward(&algebra, &increments, Some(&start), inverse, None);
      let (out, segments) = segmented_forward(&algebra, &increments, Some(&start), inverse, 3);
      assert_eq!(segments.bounds.len(), 3);
      assert!(out.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-12 ));

      let grad: Vec<f64> = (0..algebra.size()).map(|i| (i as f64).cos() ).collect();
      let mut expected_grad = vec![0.0; increments.len()];
      let expected_start = chain_backward(&algebra, &increments, Some(&start), inverse, &expected, false, &grad, &mut expected_grad);
      let mut grad_increments = vec![0.0; increments.len()];
      let grad_start = segmented_backward(&algebra, &increments, inverse, &segments, &grad, &mut grad_increments);
      assert!(grad_increments.iter().zip(&expected_grad).all(|(a, b)| (a - b).abs() < 1e-9 ));
      assert!(grad_start.iter().zip(&expected_start).all(|(a, b)| (a - b).abs() < 1e-9 ));
    }
  }

  #[test]
  fn unfold() {
    let x = Tensor::arrange(&[1,5,1], 0.0, 1.0).trained();
    let y = x.unary_op(Unfold { pieces: 2, length: 2 });
    assert_eq!(y.tensor(), &Tensor::new(&[2,3,1], vec![0.0, 1.0, 2.0, 2.0, 3.0, 4.0]));
    y.backward().unwrap();
    assert_eq!(x.grad(), Some(&Tensor::new(&[1,5,1], vec![1.0, 1.0, 2.0, 1.0, 1.0])));
  }
}
