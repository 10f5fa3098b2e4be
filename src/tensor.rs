use std::sync::Arc;
use std::ops::Range;

use parking_lot::{ RwLock, RwLockReadGuard };
use serde::{ Serialize, Deserialize };

mod lops;

use crate::{
  internal::*,
  shape::Shape,
  variable::Variable,
  scalar::{ Inner, Numeric, Real },
};


/// Multidimensional array.
///
/// Tensors share their storage between clones and views. Slicing,
/// narrowing and flipping only produce a new [Shape] over the same data.
///
/// [Real] tensors can be wrapped in a [Variable] by
/// calling [tracked](Tensor::tracked) or [trained](Tensor::trained).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor<T: Inner> {
  shape: Shape,
  data: Arc<RwLock<Vec<T>>>,
}

impl<T: Inner> PartialEq for Tensor<T> {
  fn eq(&self, rhs: &Self) -> bool {
    if self.shape.dims != rhs.shape.dims { return false }
    let data_l = self.data.read();
    let data_r = rhs.data.read();
    self.shape.iter()
      .zip(rhs.shape.iter())
      .all(|(i, j)| data_l[i] == data_r[j] )
  }
}

impl<T: Inner> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Self {
    assert_eq!(shape.size(), data.len(),
      "{} doesn't match data length {}", shape, data.len());
    Self { shape, data: Arc::new(RwLock::new(data)) }
  }

  pub fn new(shape: &[usize], data: Vec<T>) -> Self {
    Self::from_shape(Shape::new(shape), data)
  }

  pub fn vec(vec: &[T]) -> Self {
    Self::new(&[vec.len()], vec.to_vec())
  }

  pub fn scalar(item: T) -> Self {
    Self::new(&[], vec![item])
  }

  pub fn fill(shape: &[usize], filler: T) -> Self {
    Self::new(shape, vec![filler; shape.iter().product()])
  }

  pub fn dims(&self) -> &[usize] {
    &self.shape.dims
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  /// Raw storage, ignoring this tensor's strides.

  pub fn raw(&self) -> RwLockReadGuard<Vec<T>> {
    self.data.read()
  }

  /// Elements in row-major order of this tensor's shape.

  pub fn to_vec(&self) -> Vec<T> {
    self.param_iter().collect()
  }

  pub fn shared_with(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.data, &other.data)
  }

  /// Copy into fresh, contiguous storage.

  pub fn detach(&self) -> Self {
    Self::new(&self.shape.dims, self.to_vec())
  }

  pub fn contiguous(&self) -> Self {
    if self.shape.contiguous() {
      self.clone()
    } else {
      self.detach()
    }
  }

  pub fn vectorize<O, F>(&self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: FnMut(T) -> O,
  {
    let data = self.param_iter().map(cb).collect();
    Tensor::new(&self.shape.dims, data)
  }

  pub fn zip<O, F>(&self, rhs: &Self, mut cb: F) -> Tensor<O>
  where
    O: Inner,
    F: FnMut(T, T) -> O,
  {
    assert_eq!(self.shape.dims, rhs.shape.dims,
      "Cannot combine {} with {}", self.shape, rhs.shape);
    let data = self.param_iter()
      .zip(rhs.param_iter())
      .map(|(a, b)| cb(a, b) )
      .collect();
    Tensor::new(&self.shape.dims, data)
  }

  /// Update this tensor's elements in place from an equally shaped tensor.

  pub fn op_assign<F>(&self, other: &Self, cb: F)
  where
    F: Fn(&mut T, T),
  {
    assert_eq!(self.shape.dims, other.shape.dims,
      "Cannot assign {} tensor to {} tensor", other.shape, self.shape);
    // Avoid clashing locks when tensors share storage
    let other = if self.shared_with(other) { other.detach() } else { other.clone() };
    let other_data = other.data.read();
    let mut data = self.data.write();
    for (i, j) in self.shape.iter().zip(other.shape.iter()) {
      cb(&mut data[i], other_data[j]);
    }
  }

  pub fn assign(&self, other: &Self) {
    self.op_assign(other, |a, b| *a = b );
  }

  pub fn refill(&self, filler: T) {
    let mut data = self.data.write();
    for i in self.shape.iter() {
      data[i] = filler;
    }
  }

  pub fn param_iter(&self) -> TensorIterator<T> {
    TensorIterator::new(self)
  }

  /// Iterate over sub-tensors along the leading dimension.

  pub fn iter(&self) -> impl Iterator<Item = Tensor<T>> + '_ {
    (0..self.shape.dims.first().copied().unwrap_or(0)).map(move |i| self.at(&[i]) )
  }

  pub fn at(&self, indices: &[usize]) -> Self {
    Self { shape: self.shape.take(indices), data: self.data.clone() }
  }

  pub fn range(&self, ranges: &[Range<isize>]) -> Self {
    Self { shape: self.shape.range(ranges), data: self.data.clone() }
  }

  pub fn item(&self) -> T {
    assert!(self.size() == 1, "Can't extract item from non-scalar {}", self.shape);
    self.raw()[self.shape.offset]
  }
}

impl<T: Numeric> Tensor<T> {
  pub fn zeros(shape: &[usize]) -> Self {
    Self::fill(shape, T::zero())
  }

  pub fn ones(shape: &[usize]) -> Self {
    Self::fill(shape, T::one())
  }

  pub fn arrange(shape: &[usize], start: T, step: T) -> Self {
    let mut value = start;
    let data = (0..shape.iter().product::<usize>())
      .map(|_| {
        let out = value;
        value += step;
        out
      })
      .collect();
    Self::new(shape, data)
  }

  pub fn sum_all(&self) -> T {
    self.param_iter().sum()
  }
}

impl<T: Real> Tensor<T> {
  pub fn randn(shape: &[usize]) -> Self {
    let len = shape.iter().product();
    let mut data = vec![T::zero(); len];
    for i in 0..(len + 1) / 2 {
      let j = i * 2;
      let (r1, r2): (T, T) = randn();
      data[j] = r1;
      data[(j + 1) % len] = r2;
    }
    Self::new(shape, data)
  }

  pub fn max_abs_diff(&self, rhs: &Self) -> T {
    self.zip(rhs, |a, b| (a - b).abs() )
      .param_iter()
      .fold(T::zero(), |acc, a| acc.max(a) )
  }

  /// Elementwise `|a - b| <= atol + rtol * |b|`.

  pub fn allclose_tol(&self, rhs: &Self, rtol: T, atol: T) -> bool {
    self.shape.dims == rhs.shape.dims &&
      self.param_iter()
        .zip(rhs.param_iter())
        .all(|(a, b)| (a - b).abs() <= atol + rtol * b.abs() )
  }

  pub fn allclose(&self, rhs: &Self) -> bool {
    self.allclose_tol(rhs, T::from(1e-5).unwrap(), T::from(1e-8).unwrap())
  }

  pub fn trained(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), true)
  }

  pub fn tracked(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), false)
  }
}

impl<T: Inner> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.shape.dims)?;
    print_chunks(0, &self.shape.dims, &self.to_vec(), f)
  }
}

fn print_chunks<T: std::fmt::Debug>(idx: usize, dims: &[usize], vec: &[T], f: &mut std::fmt::Formatter) -> std::fmt::Result {
  let indent = "  ".repeat(idx);
  if dims.is_empty() {
    writeln!(f, "{indent}{:?}", vec[0])?;
  } else if idx == dims.len() - 1 || vec.is_empty() {
    writeln!(f, "{indent}{:?}", vec)?;
  } else {
    writeln!(f, "{indent}[")?;
    for chunk in vec.chunks(vec.len() / dims[idx]) {
      print_chunks(idx + 1, dims, chunk, f)?;
    }
    writeln!(f, "{indent}]")?;
  }
  Ok(())
}


pub struct TensorIterator<'a, T: Inner> {
  data: RwLockReadGuard<'a, Vec<T>>,
  shape_iter: Box<dyn Iterator<Item=usize> + 'a>,
}

impl<'a, T: Inner> TensorIterator<'a, T> {
  fn new(tensor: &'a Tensor<T>) -> Self {
    Self {
      data: tensor.data.read(),
      shape_iter: tensor.shape.iter(),
    }
  }
}

impl<T: Inner> Iterator for TensorIterator<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    self.shape_iter.next().map(|i| self.data[i] )
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::BaseOps;

  #[test]
  fn index() {
    let x = Tensor::new(&[2,2,2], vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(x.at(&[0,0]), Tensor::vec(&[1, 2]));
    assert_eq!(x.at(&[1,1]), Tensor::vec(&[7, 8]));
    assert_eq!(x.at(&[0]), Tensor::new(&[2,2], vec![1, 2, 3, 4]));
  }

  #[test]
  fn range() {
    let x = Tensor::vec(&[3, 5, 6]);
    assert_eq!(x.range(&[1..-1]), Tensor::vec(&[5, 6]));
  }

  #[test]
  fn narrow_and_flip() {
    let x = Tensor::new(&[1,4,2], vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let y = x.narrow(1, 1, 2).flip(1);
    assert_eq!(y, Tensor::new(&[1,2,2], vec![5, 6, 3, 4]));
    assert!(y.shared_with(&x));
    assert_eq!(y.detach().raw().len(), 4);
  }

  #[test]
  fn serde() {
    let x = Tensor::<f64>::arrange(&[2,3,2], 0.0, 0.5).narrow(1, 1, 2).flip(2);
    let json = serde_json::to_string(&x).unwrap();
    let y: Tensor<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(y, x);
    assert_eq!(y.shape(), x.shape());
    assert!(!y.shared_with(&x));
  }

  #[test]
  fn concat() {
    let a = Tensor::new(&[2,3], vec![1, 2, 3, 4, 5, 6]);
    let b = Tensor::new(&[2,1], vec![7, 8]);
    assert_eq!(a.concat(&b, 1), Tensor::new(&[2,4], vec![1, 2, 3, 7, 4, 5, 6, 8]));
    let c = Tensor::new(&[1,3], vec![9, 9, 9]);
    assert_eq!(a.concat(&c, 0), Tensor::new(&[3,3], vec![1, 2, 3, 4, 5, 6, 9, 9, 9]));
  }

  #[test]
  fn op_assign_shared() {
    let a = Tensor::vec(&[1.0, 2.0]);
    a.op_assign(&a.clone(), |x, y| *x += y );
    assert_eq!(a, Tensor::vec(&[2.0, 4.0]));
  }

  #[test]
  fn allclose() {
    let a = Tensor::vec(&[1.0, 2.0]);
    assert!(a.allclose(&Tensor::vec(&[1.0, 2.0 + 1e-9])));
    assert!(!a.allclose(&Tensor::vec(&[1.0, 2.1])));
    assert_eq!(a.max_abs_diff(&Tensor::vec(&[1.5, 2.0])), 0.5);
  }

  #[test]
  fn randn() {
    let a = Tensor::<f64>::randn(&[3,5]);
    assert_eq!(a.dims(), &[3,5]);
    assert!(a.param_iter().all(|x| x.is_finite() ));
  }
}
