use std::ops::Mul;

use crate::Shape;
use crate::scalar::{ Inner, Numeric };


/// Layout operations that are differentiable when called on a
/// [Variable](crate::Variable) and plain views when called on a
/// [Tensor](crate::Tensor).

pub trait BaseOps<I: Inner>: Clone + Sized {
  fn shape(&self) -> &Shape;
  fn reshape(&self, dims: &[usize]) -> Self;
  fn narrow(&self, dim: isize, start: usize, len: usize) -> Self;
  fn flip(&self, dim: isize) -> Self;
  fn concat(&self, rhs: &Self, dim: isize) -> Self;

  fn dim(&self, dim: isize) -> usize {
    self.shape()[dim]
  }
}


/// Reductions and arithmetic shared by tensors and variables.

pub trait NumericOps<I: Numeric>: Sized {
  /// Sum of all elements, as a scalar.
  fn sum(&self) -> Self;
  fn scale(&self, factor: I) -> Self;
}


/// High-level operations, implemented exclusively on top of
/// the lower-level ones. As a result, these are all
/// differentiable when called on a [Variable](crate::Variable).

pub trait Hops<I: Numeric>: BaseOps<I> + NumericOps<I>
where
  for<'a> &'a Self: Mul<&'a Self, Output = Self>,
{
  fn dot(&self, rhs: &Self) -> Self {
    (self * rhs).sum()
  }
}
