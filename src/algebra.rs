use std::ops::Range;

use crate::{
  internal::*,
  scalar::Real,
};


/// Number of coordinates in a signature of the given depth:
/// the sum of `channels^k` for `k` in `1..=depth`.

pub fn signature_channels(channels: usize, depth: usize) -> usize {
  (1..=depth).map(|k| channels.pow(k as u32) ).sum()
}


/// Layout of the truncated tensor algebra over `channels` letters.
///
/// Elements are flat slices holding the levels `1..=depth` back to back,
/// each level a row-major flattening of its `channels^k` words, the first
/// letter being the most significant digit. The scalar level is implicit
/// and always one, so the identity element is the all-zero slice.
///
/// All operations work on plain slices and never allocate unless they need
/// scratch space. Products accumulate through [Cops](crate::scalar::Cops),
/// so they are backed by `matrixmultiply` when the `unsafe` feature is on.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Algebra {
  channels: usize,
  depth: usize,
  offsets: Vec<usize>,
}

impl Algebra {
  pub fn new(channels: usize, depth: usize) -> Self {
    let mut offsets = vec![0; depth + 1];
    for k in 1..=depth {
      offsets[k] = offsets[k - 1] + channels.pow(k as u32);
    }
    Self { channels, depth, offsets }
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn size(&self) -> usize {
    self.offsets[self.depth]
  }

  pub fn level_size(&self, k: usize) -> usize {
    self.offsets[k] - self.offsets[k - 1]
  }

  /// Position of level `k` inside a flat element.

  pub fn level(&self, k: usize) -> Range<usize> {
    self.offsets[k - 1]..self.offsets[k]
  }

  /// Flat position of a word given as a list of letters.

  pub fn word_index(&self, word: &[usize]) -> usize {
    let within = word.iter().fold(0, |acc, &letter| acc * self.channels + letter );
    self.offsets[word.len() - 1] + within
  }

  /// Index of the reversed word within level `k`.

  pub fn reverse_index(&self, k: usize, mut index: usize) -> usize {
    let mut out = 0;
    for _ in 0..k {
      out = out * self.channels + index % self.channels;
      index /= self.channels;
    }
    out
  }

  /// Truncated exponential of a level one element `z`.

  pub fn exp<T: Real>(&self, z: &[T], out: &mut [T]) {
    let c = self.channels;
    out[self.level(1)].copy_from_slice(&z[..c]);
    for k in 2..=self.depth {
      let (low, high) = out.split_at_mut(self.offsets[k - 1]);
      let prev = &low[self.level(k - 1)];
      let current = &mut high[..self.level_size(k)];
      let divisor = real::<T>(k);
      for (i, &a) in prev.iter().enumerate() {
        let a = a / divisor;
        for (j, &b) in z[..c].iter().enumerate() {
          current[i * c + j] = a * b;
        }
      }
    }
  }

  /// Accumulate the gradient of [exp](Algebra::exp) into `grad_z`.
  ///
  /// `e` must be the result of the forward call.

  pub fn exp_backward<T: Real>(&self, z: &[T], e: &[T], grad_e: &[T], grad_z: &mut [T]) {
    let c = self.channels;
    let mut grad_e = grad_e.to_vec();
    for k in (2..=self.depth).rev() {
      let (low, high) = grad_e.split_at_mut(self.offsets[k - 1]);
      let divisor = real::<T>(k);
      let g: Vec<T> = high[..self.level_size(k)].iter().map(|&x| x / divisor ).collect();
      let m = self.level_size(k - 1);
      T::gemm_acc(m, c, 1, &g, &z[..c], &mut low[self.level(k - 1)]);
      T::gemm_acc(1, m, c, &e[self.level(k - 1)], &g, &mut grad_z[..c]);
    }
    for (out, &g) in grad_z[..c].iter_mut().zip(&grad_e[self.level(1)]) {
      *out += g;
    }
  }

  /// Chen product `a <- a ⊗ b`.

  pub fn mult<T: Real>(&self, a: &mut [T], b: &[T]) {
    // Walk levels top down, so lower levels of a are still the old ones
    for k in (1..=self.depth).rev() {
      let (low, high) = a.split_at_mut(self.offsets[k - 1]);
      let target = &mut high[..self.level_size(k)];
      for i in 1..k {
        let j = k - i;
        T::gemm_acc(self.level_size(i), 1, self.level_size(j), &low[self.level(i)], &b[self.level(j)], target);
      }
      for (out, &y) in target.iter_mut().zip(&b[self.level(k)]) {
        *out += y;
      }
    }
  }

  /// Chen product from the left `b <- a ⊗ b`.

  pub fn mult_left<T: Real>(&self, a: &[T], b: &mut [T]) {
    for k in (1..=self.depth).rev() {
      let (low, high) = b.split_at_mut(self.offsets[k - 1]);
      let target = &mut high[..self.level_size(k)];
      for i in 1..k {
        let j = k - i;
        T::gemm_acc(self.level_size(i), 1, self.level_size(j), &a[self.level(i)], &low[self.level(j)], target);
      }
      for (out, &x) in target.iter_mut().zip(&a[self.level(k)]) {
        *out += x;
      }
    }
  }

  /// Accumulate the gradients of `c = a ⊗ b` with respect to both factors.

  pub fn mult_backward<T: Real>(&self, a: &[T], b: &[T], grad_c: &[T], grad_a: &mut [T], grad_b: &mut [T]) {
    for (out, &g) in grad_a.iter_mut().zip(grad_c) {
      *out += g;
    }
    for (out, &g) in grad_b.iter_mut().zip(grad_c) {
      *out += g;
    }
    self.mult_partial_backward(a, b, grad_c, grad_a, grad_b);
  }

  /// Product of two elements without their scalar units,
  /// written to `out`.

  pub fn mult_partial<T: Real>(&self, a: &[T], b: &[T], out: &mut [T]) {
    out.iter_mut().for_each(|x| *x = T::zero() );
    for k in 2..=self.depth {
      let target = &mut out[self.level(k)];
      for i in 1..k {
        let j = k - i;
        T::gemm_acc(self.level_size(i), 1, self.level_size(j), &a[self.level(i)], &b[self.level(j)], target);
      }
    }
  }

  pub fn mult_partial_backward<T: Real>(&self, a: &[T], b: &[T], grad_c: &[T], grad_a: &mut [T], grad_b: &mut [T]) {
    for k in 2..=self.depth {
      let g = &grad_c[self.level(k)];
      for i in 1..k {
        let j = k - i;
        let (m, n) = (self.level_size(i), self.level_size(j));
        T::gemm_acc(m, n, 1, g, &b[self.level(j)], &mut grad_a[self.level(i)]);
        T::gemm_acc(1, m, n, &a[self.level(i)], g, &mut grad_b[self.level(j)]);
      }
    }
  }

  fn log_coefficient<T: Real>(n: usize) -> T {
    let c = T::one() / real(n);
    if n % 2 == 0 { -c } else { c }
  }

  /// Powers `x, x^2, .., x^depth` of an element without its unit.

  fn powers<T: Real>(&self, x: &[T]) -> Vec<Vec<T>> {
    let mut powers = vec![x.to_vec()];
    for n in 1..self.depth {
      let mut next = vec![T::zero(); self.size()];
      self.mult_partial(&powers[n - 1], x, &mut next);
      powers.push(next);
    }
    powers
  }

  /// Tensor logarithm `log(1 + x)` of a group-like element.

  pub fn log<T: Real>(&self, x: &[T], out: &mut [T]) {
    out.iter_mut().for_each(|v| *v = T::zero() );
    for (n, power) in self.powers(x).iter().enumerate() {
      let coefficient: T = Self::log_coefficient(n + 1);
      for (o, &p) in out.iter_mut().zip(power) {
        *o += coefficient * p;
      }
    }
  }

  /// Accumulate the gradient of [log](Algebra::log) into `grad_x`.

  pub fn log_backward<T: Real>(&self, x: &[T], grad_log: &[T], grad_x: &mut [T]) {
    let powers = self.powers(x);
    let mut grad_powers: Vec<Vec<T>> = (1..=self.depth)
      .map(|n| {
        let coefficient: T = Self::log_coefficient(n);
        grad_log.iter().map(|&g| coefficient * g ).collect()
      })
      .collect();
    for n in (1..self.depth).rev() {
      let (low, high) = grad_powers.split_at_mut(n);
      self.mult_partial_backward(&powers[n - 1], x, &high[0], &mut low[n - 1], grad_x);
    }
    for (out, &g) in grad_x.iter_mut().zip(&grad_powers[0]) {
      *out += g;
    }
  }

  /// Group inverse of a signature, applying the antipode
  /// `x_w -> (-1)^|w| x_reverse(w)`.
  ///
  /// The map is a signed permutation and therefore its own adjoint,
  /// which makes it usable for gradients as well.

  pub fn invert<T: Real>(&self, x: &[T], out: &mut [T]) {
    for k in 1..=self.depth {
      let range = self.level(k);
      let sign = if k % 2 == 0 { T::one() } else { -T::one() };
      let source = &x[range.clone()];
      let target = &mut out[range];
      for (i, value) in target.iter_mut().enumerate() {
        *value = sign * source[self.reverse_index(k, i)];
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-10 )
  }

  fn exp(algebra: &Algebra, z: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; algebra.size()];
    algebra.exp(z, &mut out);
    out
  }

  #[test]
  fn sizes() {
    assert_eq!(signature_channels(2, 3), 14);
    assert_eq!(signature_channels(1, 4), 4);
    let algebra = Algebra::new(3, 3);
    assert_eq!(algebra.size(), 39);
    assert_eq!(algebra.level(2), 3..12);
    assert_eq!(algebra.word_index(&[1, 0]), 6);
    assert_eq!(algebra.word_index(&[2, 1, 0]), 12 + 21);
  }

  #[test]
  fn reverse_index() {
    let algebra = Algebra::new(3, 3);
    // 012 <-> 210
    assert_eq!(algebra.reverse_index(3, 5), 21);
    assert_eq!(algebra.reverse_index(3, 21), 5);
    assert_eq!(algebra.reverse_index(1, 2), 2);
  }

  #[test]
  fn exp_levels() {
    let algebra = Algebra::new(2, 3);
    let e = exp(&algebra, &[1.0, 2.0]);
    assert!(close(&e, &[
      1.0, 2.0,
      0.5, 1.0, 1.0, 2.0,
      1.0 / 6.0, 2.0 / 6.0, 2.0 / 6.0, 4.0 / 6.0, 2.0 / 6.0, 4.0 / 6.0, 4.0 / 6.0, 8.0 / 6.0,
    ]));
  }

  #[test]
  fn exp_of_sum_is_product_for_parallel_steps() {
    // Collinear increments commute, so exp(a) ⊗ exp(b) = exp(a + b)
    let algebra = Algebra::new(2, 4);
    let mut a = exp(&algebra, &[0.3, -0.6]);
    let b = exp(&algebra, &[0.1, -0.2]);
    algebra.mult(&mut a, &b);
    assert!(close(&a, &exp(&algebra, &[0.4, -0.8])));
  }

  #[test]
  fn mult_left_matches_mult() {
    let algebra = Algebra::new(2, 3);
    let x = exp(&algebra, &[0.3, -0.6]);
    let y = exp(&algebra, &[1.1, 0.5]);
    let mut right = x.clone();
    algebra.mult(&mut right, &y);
    let mut left = y.clone();
    algebra.mult_left(&x, &mut left);
    assert!(close(&right, &left));
  }

  #[test]
  fn log_inverts_exp() {
    let algebra = Algebra::new(3, 4);
    let z = [0.7, -0.2, 1.3];
    let e = exp(&algebra, &z);
    let mut l = vec![0.0; algebra.size()];
    algebra.log(&e, &mut l);
    let mut expected = vec![0.0; algebra.size()];
    expected[..3].copy_from_slice(&z);
    assert!(close(&l, &expected));
  }

  #[test]
  fn invert_gives_group_inverse() {
    let algebra = Algebra::new(2, 3);
    let mut x = exp(&algebra, &[0.3, -0.6]);
    algebra.mult(&mut x, &exp(&algebra, &[1.1, 0.5]));
    let mut inverse = vec![0.0; algebra.size()];
    algebra.invert(&x, &mut inverse);
    algebra.mult(&mut x, &inverse);
    assert!(close(&x, &vec![0.0; algebra.size()]));
  }

  fn numeric_grad<F: Fn(&[f64]) -> f64>(x: &[f64], f: F) -> Vec<f64> {
    let eps = 1e-6;
    (0..x.len()).map(|i| {
      let mut up = x.to_vec();
      let mut down = x.to_vec();
      up[i] += eps;
      down[i] -= eps;
      (f(&up) - f(&down)) / (2.0 * eps)
    }).collect()
  }

  fn weights(n: usize) -> Vec<f64> {
    (0..n).map(|i| ((i * 7 % 5) as f64 - 2.0) * 0.3 ).collect()
  }

  fn weighted(v: &[f64], w: &[f64]) -> f64 {
    v.iter().zip(w).map(|(a, b)| a * b ).sum()
  }

  #[test]
  fn exp_gradient() {
    let algebra = Algebra::new(2, 3);
    let w = weights(algebra.size());
    let z = [0.4, -1.2];
    let e = exp(&algebra, &z);
    let mut grad = vec![0.0; 2];
    algebra.exp_backward(&z, &e, &w, &mut grad);
    let expected = numeric_grad(&z, |z| weighted(&exp(&algebra, z), &w) );
    assert!(grad.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-6 ));
  }

  #[test]
  fn mult_gradient() {
    let algebra = Algebra::new(2, 3);
    let w = weights(algebra.size());
    let a = exp(&algebra, &[0.4, -1.2]);
    let b = exp(&algebra, &[-0.3, 0.9]);
    let mut grad_a = vec![0.0; algebra.size()];
    let mut grad_b = vec![0.0; algebra.size()];
    algebra.mult_backward(&a, &b, &w, &mut grad_a, &mut grad_b);
    let product = |a: &[f64], b: &[f64]| {
      let mut out = a.to_vec();
      algebra.mult(&mut out, b);
      weighted(&out, &w)
    };
    let expected_a = numeric_grad(&a, |a| product(a, &b) );
    let expected_b = numeric_grad(&b, |b| product(&a, b) );
    assert!(grad_a.iter().zip(&expected_a).all(|(x, y)| (x - y).abs() < 1e-6 ));
    assert!(grad_b.iter().zip(&expected_b).all(|(x, y)| (x - y).abs() < 1e-6 ));
  }

  #[test]
  fn log_gradient() {
    let algebra = Algebra::new(2, 3);
    let w = weights(algebra.size());
    let mut x = exp(&algebra, &[0.4, -1.2]);
    algebra.mult(&mut x, &exp(&algebra, &[-0.3, 0.9]));
    let mut grad = vec![0.0; algebra.size()];
    algebra.log_backward(&x, &w, &mut grad);
    let expected = numeric_grad(&x, |x| {
      let mut out = vec![0.0; algebra.size()];
      algebra.log(x, &mut out);
      weighted(&out, &w)
    });
    assert!(grad.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-6 ));
  }
}
