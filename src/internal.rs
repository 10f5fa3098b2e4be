use std::sync::atomic::{ AtomicUsize, Ordering };

use rand::Rng;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::scalar::Real;


#[inline]
pub fn negative_index(i: isize, n: usize, start_behind: bool) -> usize {
  if i < 0 {
    let offset = if start_behind { 1 } else { 0 };
    (n as isize + i + offset) as usize
  } else {
    i as usize
  }
}


/// Unique id for graph nodes and forward executions.

pub fn make_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


/// Lossless for every count this crate deals in.

#[inline]
pub fn real<T: Real>(n: usize) -> T {
  T::from(n).unwrap()
}


// Polar Box-Muller transformation

pub fn randn<T: Real>() -> (T, T) {
  let mut rng = rand::thread_rng();
  let u = rng.gen_range(-T::one(), T::one());
  let v = rng.gen_range(-T::one(), T::one());
  let r = u * u + v * v;
  // Try again if outside interval
  if r == T::zero() || r >= T::one() { return randn() }
  let c = (T::from(-2.0).unwrap() * r.ln() / r).sqrt();
  (u * c, v * c)
}


/// Map over batch elements, in parallel with the `rayon` feature.

pub fn batch_map<R, F>(batch: usize, cb: F) -> Vec<R>
where
  R: Send,
  F: Fn(usize) -> R + Send + Sync,
{
  #[cfg(feature = "rayon")]
  let out = (0..batch).into_par_iter().map(cb).collect();

  #[cfg(not(feature = "rayon"))]
  let out = (0..batch).map(cb).collect();

  out
}
