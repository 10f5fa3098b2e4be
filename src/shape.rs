use std::ops::Range;

use serde::{ Serialize, Deserialize };

use crate::internal::*;


/// The shape of a [Tensor](crate::Tensor).
///
/// Besides its dimensions a shape carries strides and an offset into
/// the underlying storage, which lets views like slices and flips share
/// memory with the tensor they were taken from.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
  pub dims: Vec<usize>,
  pub(crate) strides: Vec<isize>,
  pub(crate) offset: usize,
}

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self {
      dims: dims.to_vec(),
      strides: Self::make_strides(dims),
      offset: 0,
    }
  }

  fn make_strides(dims: &[usize]) -> Vec<isize> {
    let mut strides = vec![1; dims.len()];
    for i in (1..dims.len()).rev() {
      strides[i - 1] = dims[i] as isize * strides[i];
    }
    strides
  }

  pub fn size(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub(crate) fn index(&self, indices: &[usize]) -> usize {
    assert!(indices.len() <= self.rank(), "Too many indices for {}", self);
    let delta: isize = indices.iter()
      .zip(&self.strides)
      .map(|(&i, &s)| i as isize * s )
      .sum();
    (self.offset as isize + delta) as usize
  }

  pub fn contiguous(&self) -> bool {
    self.strides == Self::make_strides(&self.dims)
  }

  /// Storage positions of all elements, in row-major order.

  pub fn iter(&self) -> Box<dyn Iterator<Item=usize> + '_> {
    if self.contiguous() {
      Box::new(self.offset..self.offset + self.size())
    } else {
      Box::new(ShapeIterator::new(self))
    }
  }

  pub fn view(&self, dims: &[usize]) -> Self {
    assert!(self.contiguous(), "Cannot view non-contiguous {}", self);
    assert_eq!(self.size(), dims.iter().product::<usize>(),
      "Cannot view {} as Shape{:?}", self, dims);
    Self { dims: dims.to_vec(), strides: Self::make_strides(dims), offset: self.offset }
  }

  /// Fix the leading dimensions to the given indices.

  pub fn take(&self, indices: &[usize]) -> Self {
    for (&i, &n) in indices.iter().zip(&self.dims) {
      assert!(i < n, "Index {} out of bounds for {}", i, self);
    }
    Self {
      dims: self.dims[indices.len()..].to_vec(),
      strides: self.strides[indices.len()..].to_vec(),
      offset: self.index(indices),
    }
  }

  /// Restrict the leading dimensions to the given ranges.
  /// Negative bounds count from the end.

  pub fn range(&self, ranges: &[Range<isize>]) -> Self {
    let mut shape = self.clone();
    for (d, range) in ranges.iter().enumerate() {
      let start = negative_index(range.start, self.dims[d], true);
      let end = negative_index(range.end, self.dims[d], true);
      shape = shape.narrow(d, start, end - start);
    }
    shape
  }

  pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Self {
    assert!(start + len <= self.dims[dim],
      "Cannot narrow dim {} of {} to {}..{}", dim, self, start, start + len);
    let mut shape = self.clone();
    shape.offset = (self.offset as isize + self.strides[dim] * start as isize) as usize;
    shape.dims[dim] = len;
    shape
  }

  /// Reverse the order of elements along one dimension.

  pub fn flip(&self, dim: usize) -> Self {
    let mut shape = self.clone();
    if self.dims[dim] > 0 {
      let last = (self.dims[dim] - 1) as isize * self.strides[dim];
      shape.offset = (self.offset as isize + last) as usize;
    }
    shape.strides[dim] = -self.strides[dim];
    shape
  }
}

impl std::ops::Index<isize> for Shape {
  type Output = usize;

  fn index(&self, i: isize) -> &usize {
    &self.dims[negative_index(i, self.rank(), false)]
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Shape{:?}", self.dims)
  }
}


/// Walks a strided [Shape] like an odometer, yielding storage positions.

pub struct ShapeIterator<'a> {
  shape: &'a Shape,
  counter: Vec<usize>,
  position: isize,
  remaining: usize,
}

impl<'a> ShapeIterator<'a> {
  fn new(shape: &'a Shape) -> Self {
    Self {
      counter: vec![0; shape.rank()],
      position: shape.offset as isize,
      remaining: shape.size(),
      shape,
    }
  }
}

impl<'a> Iterator for ShapeIterator<'a> {
  type Item = usize;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 { return None }
    self.remaining -= 1;
    let out = self.position as usize;
    // Advance innermost digit, carrying into outer ones
    for d in (0..self.counter.len()).rev() {
      self.counter[d] += 1;
      self.position += self.shape.strides[d];
      if self.counter[d] < self.shape.dims[d] { break }
      self.position -= self.shape.dims[d] as isize * self.shape.strides[d];
      self.counter[d] = 0;
    }
    Some(out)
  }
}
