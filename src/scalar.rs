use rand::distributions::uniform::SampleUniform;
use num_traits::{ NumAssignOps, Num, NumCast };


/// All types that may be used in a [Tensor](crate::Tensor).
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Inner: PartialEq + Clone + Copy + Send + Sync + std::fmt::Debug + 'static {}
impl<T: PartialEq + Clone + Copy + Send + Sync + std::fmt::Debug + 'static> Inner for T {}


/// All numeric types.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Numeric: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum {}
impl<T: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum> Numeric for T {}


/// Dense accumulate-into kernels backing the tensor-algebra product.
///
/// All operands are contiguous and row-major:
/// `c (m x n) += a (m x k) * b (k x n)`.

pub trait Cops: Numeric {
  fn gemm_acc(m: usize, k: usize, n: usize, a: &[Self], b: &[Self], c: &mut [Self]) {
    debug_assert!(a.len() >= m * k && b.len() >= k * n && c.len() >= m * n);
    for i in 0..m {
      let row = &mut c[i * n .. (i + 1) * n];
      for l in 0..k {
        let x = a[i * k + l];
        if x == Self::zero() { continue }
        let b_row = &b[l * n .. (l + 1) * n];
        for (out, &y) in row.iter_mut().zip(b_row) {
          *out += x * y;
        }
      }
    }
  }
}

impl Cops for f32 {
  #[cfg(feature = "unsafe")]
  fn gemm_acc(m: usize, k: usize, n: usize, a: &[f32], b: &[f32], c: &mut [f32]) {
    if m == 0 || k == 0 || n == 0 { return }
    assert!(a.len() >= m * k && b.len() >= k * n && c.len() >= m * n);
    unsafe {
      matrixmultiply::sgemm(
        m, k, n,
        1.0,
        a.as_ptr(), k as isize, 1,
        b.as_ptr(), n as isize, 1,
        1.0,
        c.as_mut_ptr(), n as isize, 1,
      );
    }
  }
}

impl Cops for f64 {
  #[cfg(feature = "unsafe")]
  fn gemm_acc(m: usize, k: usize, n: usize, a: &[f64], b: &[f64], c: &mut [f64]) {
    if m == 0 || k == 0 || n == 0 { return }
    assert!(a.len() >= m * k && b.len() >= k * n && c.len() >= m * n);
    unsafe {
      matrixmultiply::dgemm(
        m, k, n,
        1.0,
        a.as_ptr(), k as isize, 1,
        b.as_ptr(), n as isize, 1,
        1.0,
        c.as_mut_ptr(), n as isize, 1,
      );
    }
  }
}


/// All continuous numeric types signatures can be computed for.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Real: Numeric + num_traits::real::Real + SampleUniform + Cops {}
impl<T: Numeric + num_traits::real::Real + SampleUniform + Cops> Real for T {}
