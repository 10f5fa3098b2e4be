use crate::{
  internal::*,
  algebra::{ Algebra, signature_channels },
  tensor::Tensor,
  variable::{ Variable, UnaryOp, BinaryOp },
  scalar::Real,
  ops::BaseOps,
  error::{ Result, SigError },
};


fn check_signature<T: Real>(signature: &Tensor<T>, channels: usize, depth: usize, rank: Option<usize>) -> Result<usize> {
  if depth < 1 {
    return Err(SigError::InvalidDepth(depth))
  }
  if channels < 1 {
    return Err(SigError::EmptyDimension { tensor: "signature", found: signature.dims().to_vec() })
  }
  if let Some(rank) = rank {
    if signature.rank() != rank {
      return Err(SigError::InvalidRank { tensor: "signature", expected: rank, found: signature.dims().to_vec() })
    }
  }
  let sigdim = signature_channels(channels, depth);
  if signature.rank() == 0 || signature.dims()[signature.rank() - 1] != sigdim {
    let mut expected = signature.dims().to_vec();
    match expected.last_mut() {
      Some(last) => *last = sigdim,
      None => expected.push(sigdim),
    }
    return Err(SigError::ShapeMismatch { tensor: "signature", expected, found: signature.dims().to_vec() })
  }
  Ok(sigdim)
}


#[derive(Debug, Clone)]
struct Combine {
  algebra: Algebra,
  inverse: bool,
}

impl<T: Real> BinaryOp<T> for Combine {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    let size = self.algebra.size();
    let (first, second) = (lhs.to_vec(), rhs.to_vec());
    let rows = batch_map(first.len() / size, |r| {
      let (a, b) = (&first[r * size .. (r + 1) * size], &second[r * size .. (r + 1) * size]);
      let mut out = a.to_vec();
      if self.inverse {
        self.algebra.mult_left(b, &mut out);
      } else {
        self.algebra.mult(&mut out, b);
      }
      out
    });
    Tensor::new(lhs.dims(), rows.concat())
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    let size = self.algebra.size();
    let (first, second, grad) = (lhs.to_vec(), rhs.to_vec(), grad.to_vec());
    let rows = batch_map(first.len() / size, |r| {
      let range = r * size .. (r + 1) * size;
      let (a, b, g) = (&first[range.clone()], &second[range.clone()], &grad[range]);
      let mut grad_a = vec![T::zero(); size];
      let mut grad_b = vec![T::zero(); size];
      if self.inverse {
        self.algebra.mult_backward(b, a, g, &mut grad_b, &mut grad_a);
      } else {
        self.algebra.mult_backward(a, b, g, &mut grad_a, &mut grad_b);
      }
      (grad_a, grad_b)
    });
    let (grad_a, grad_b): (Vec<Vec<T>>, Vec<Vec<T>>) = rows.into_iter().unzip();
    (Tensor::new(lhs.dims(), grad_a.concat()), Tensor::new(rhs.dims(), grad_b.concat()))
  }
}


/// Signature of the concatenation of two paths, given their signatures.
///
/// Both inputs share a shape ending in `signature_channels(channels, depth)`.
/// With `inverse`, both are taken to be inverted signatures and the inverted
/// signature of the concatenation gets returned.

pub fn signature_combine<T: Real>(
  first: &Variable<T>,
  second: &Variable<T>,
  channels: usize,
  depth: usize,
  inverse: bool,
) -> Result<Variable<T>> {
  check_signature(first.tensor(), channels, depth, None)?;
  check_signature(second.tensor(), channels, depth, None)?;
  if first.dims() != second.dims() {
    return Err(SigError::ShapeMismatch {
      tensor: "signature",
      expected: first.dims().to_vec(),
      found: second.dims().to_vec(),
    })
  }
  Ok(first.binary_op(Combine { algebra: Algebra::new(channels, depth), inverse }, second))
}


#[derive(Debug, Clone)]
struct MultiCombine {
  algebra: Algebra,
  inverse: bool,
}

impl MultiCombine {
  // Running products of the first 1, 2, .. count signatures
  fn prefixes<T: Real>(&self, sigs: &[T]) -> Vec<Vec<T>> {
    let size = self.algebra.size();
    let mut prefixes = vec![sigs[..size].to_vec()];
    for sig in sigs.chunks(size).skip(1) {
      let mut next = prefixes[prefixes.len() - 1].clone();
      if self.inverse {
        self.algebra.mult_left(sig, &mut next);
      } else {
        self.algebra.mult(&mut next, sig);
      }
      prefixes.push(next);
    }
    prefixes
  }
}

impl<T: Real> UnaryOp<T> for MultiCombine {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    let (batch, count, size) = (lhs.dims()[0], lhs.dims()[1], lhs.dims()[2]);
    let data = lhs.to_vec();
    let rows = batch_map(batch, |b| {
      let mut prefixes = self.prefixes(&data[b * count * size .. (b + 1) * count * size]);
      prefixes.pop().unwrap_or_default()
    });
    Tensor::new(&[batch, size], rows.concat())
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let (batch, count, size) = (lhs.dims()[0], lhs.dims()[1], lhs.dims()[2]);
    let (data, grad) = (lhs.to_vec(), grad.to_vec());
    let rows = batch_map(batch, |b| {
      let sigs = &data[b * count * size .. (b + 1) * count * size];
      let prefixes = self.prefixes(sigs);
      let mut out = vec![T::zero(); count * size];
      let mut g = grad[b * size .. (b + 1) * size].to_vec();
      for j in (1..count).rev() {
        let mut grad_prefix = vec![T::zero(); size];
        let grad_sig = &mut out[j * size .. (j + 1) * size];
        let sig = &sigs[j * size .. (j + 1) * size];
        if self.inverse {
          self.algebra.mult_backward(sig, &prefixes[j - 1], &g, grad_sig, &mut grad_prefix);
        } else {
          self.algebra.mult_backward(&prefixes[j - 1], sig, &g, &mut grad_prefix, grad_sig);
        }
        g = grad_prefix;
      }
      out[..size].copy_from_slice(&g);
      out
    });
    Tensor::new(lhs.dims(), rows.concat())
  }
}


/// Signature of the concatenation of many paths.
///
/// `signatures` has shape `(batch, count, signature_channels)` and gets
/// reduced over its middle dimension in order, or in reverse order
/// of multiplication with `inverse`.

pub fn multi_signature_combine<T: Real>(
  signatures: &Variable<T>,
  channels: usize,
  depth: usize,
  inverse: bool,
) -> Result<Variable<T>> {
  check_signature(signatures.tensor(), channels, depth, Some(3))?;
  if signatures.dims()[1] == 0 {
    return Err(SigError::EmptyDimension { tensor: "signature", found: signatures.dims().to_vec() })
  }
  Ok(signatures.unary_op(MultiCombine { algebra: Algebra::new(channels, depth), inverse }))
}


/// The level `depth` terms of a signature, that is its last
/// `channels^depth` coordinates when computed to that depth.

pub fn extract_signature_term<T: Real>(signature: &Variable<T>, channels: usize, depth: usize) -> Result<Variable<T>> {
  if depth < 1 {
    return Err(SigError::InvalidDepth(depth))
  }
  let algebra = Algebra::new(channels, depth);
  let available = signature.dims().last().copied().unwrap_or(0);
  if available < algebra.size() {
    let mut expected = signature.dims().to_vec();
    if let Some(last) = expected.last_mut() {
      *last = algebra.size();
    }
    return Err(SigError::ShapeMismatch { tensor: "signature", expected, found: signature.dims().to_vec() })
  }
  let level = algebra.level(depth);
  Ok(signature.narrow(-1, level.start, level.len()))
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::NumericOps;

  fn sigs() -> Tensor<f64> {
    // Three depth two signatures over two channels, in one batch
    Tensor::new(&[1,3,6], vec![
      1.0, 0.5, 0.5, 0.25, 0.25, 0.125,
      -0.5, 1.0, 0.125, -0.5, 0.0, 0.5,
      0.3, 0.2, 0.1, 0.0, 0.1, -0.2,
    ])
  }

  #[test]
  fn pairwise_matches_multi() {
    let sigs = sigs().tracked();
    let a = sigs.narrow(1, 0, 1).reshape(&[1,6]);
    let b = sigs.narrow(1, 1, 1).reshape(&[1,6]);
    let c = sigs.narrow(1, 2, 1).reshape(&[1,6]);
    for &inverse in &[false, true] {
      let ab = signature_combine(&a, &b, 2, 2, inverse).unwrap();
      let abc = signature_combine(&ab, &c, 2, 2, inverse).unwrap();
      let multi = multi_signature_combine(&sigs, 2, 2, inverse).unwrap();
      assert!(abc.allclose(&multi));
    }
  }

  #[test]
  fn inverse_reverses_order() {
    let sigs = sigs().tracked();
    let a = sigs.narrow(1, 0, 1).reshape(&[1,6]);
    let b = sigs.narrow(1, 1, 1).reshape(&[1,6]);
    let ab = signature_combine(&a, &b, 2, 2, true).unwrap();
    let ba = signature_combine(&b, &a, 2, 2, false).unwrap();
    assert!(ab.allclose(&ba));
  }

  #[test]
  fn gradients() {
    for &inverse in &[false, true] {
      let diff = Variable::check_gradients(&sigs(), |x| multi_signature_combine(x, 2, 2, inverse) ).unwrap();
      assert!(diff < 1e-6);
      let other = Tensor::new(&[1,6], vec![0.2, -0.1, 0.3, 0.4, -0.2, 0.1]).tracked();
      let diff = Variable::check_gradients(&sigs().at(&[0, 1]).reshape(&[1,6]), |x| {
        signature_combine(x, &other, 2, 2, inverse)
      }).unwrap();
      assert!(diff < 1e-6);
    }
  }

  #[test]
  fn shapes_are_checked() {
    let sigs = sigs().tracked();
    assert!(matches!(multi_signature_combine(&sigs, 3, 2, false), Err(SigError::ShapeMismatch { tensor: "signature", .. })));
    assert!(matches!(multi_signature_combine(&sigs.reshape(&[3,6]), 2, 2, false), Err(SigError::InvalidRank { .. })));
    let a = Tensor::<f64>::zeros(&[2,6]).tracked();
    let b = Tensor::<f64>::zeros(&[3,6]).tracked();
    assert!(signature_combine(&a, &b, 2, 2, false).is_err());
  }

  #[test]
  fn extract_term() {
    let sig = Tensor::arrange(&[2,14], 0.0, 1.0).trained();
    let term = extract_signature_term(&sig, 2, 2).unwrap();
    assert_eq!(term.tensor(), &Tensor::new(&[2,4], vec![2.0, 3.0, 4.0, 5.0, 16.0, 17.0, 18.0, 19.0]));
    term.sum().backward().unwrap();
    assert_eq!(sig.grad().unwrap().sum_all(), 8.0);
    assert!(extract_signature_term(&sig, 2, 4).is_err());
  }
}
