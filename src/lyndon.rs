use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::RwLock;
use serde::{ Serialize, Deserialize };

use crate::{
  algebra::Algebra,
  scalar::Real,
};


/// A word over the alphabet `0..channels`.

pub type Word = Vec<usize>;


/// All words of length `1..=depth`, in the order their coordinates
/// appear in a signature.

pub fn all_words(channels: usize, depth: usize) -> Vec<Word> {
  (1..=depth)
    .flat_map(|k| itertools::repeat_n(0..channels, k).multi_cartesian_product() )
    .collect()
}


/// Whether a word is strictly smaller than all of its proper suffixes.

pub fn is_lyndon(word: &[usize]) -> bool {
  !word.is_empty() && (1..word.len()).all(|i| word < &word[i..] )
}


/// All Lyndon words of length `1..=depth`, ordered by length first and
/// lexicographically within each length.

pub fn lyndon_words(channels: usize, depth: usize) -> Vec<Word> {
  let mut words = vec![];
  if channels == 0 || depth == 0 { return words }
  // Duval's algorithm yields them in lexicographic order
  let mut word = vec![0];
  loop {
    words.push(word.clone());
    let period = word.len();
    while word.len() < depth {
      word.push(word[word.len() - period]);
    }
    while word.last() == Some(&(channels - 1)) {
      word.pop();
    }
    match word.last_mut() {
      Some(letter) => *letter += 1,
      None => break,
    }
  }
  words.sort_by_key(|word| word.len() );
  words
}


/// Split a Lyndon word of length two or more into `(u, v)` where `v` is
/// its longest proper Lyndon suffix. Both parts are Lyndon words themselves.

pub fn standard_factorization(word: &[usize]) -> (&[usize], &[usize]) {
  let split = (1..word.len())
    .find(|&i| is_lyndon(&word[i..]) )
    .unwrap_or(word.len() - 1);
  word.split_at(split)
}


/// Number of Lyndon words of length `1..=depth`, which is the
/// dimension of the truncated free Lie algebra (Witt's formula).

pub fn logsignature_channels(channels: usize, depth: usize) -> usize {
  (1..=depth)
    .map(|k| {
      let total: i64 = (1..=k)
        .filter(|d| k % d == 0 )
        .map(|d| mobius(d) * (channels as i64).pow((k / d) as u32) )
        .sum();
      (total / k as i64) as usize
    })
    .sum()
}

fn mobius(mut n: usize) -> i64 {
  let mut out = 1;
  let mut p = 2;
  while p * p <= n {
    if n % p == 0 {
      n /= p;
      if n % p == 0 { return 0 }
      out = -out;
    }
    p += 1;
  }
  if n > 1 { -out } else { out }
}


/// A Lie bracket of letters.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bracket {
  Letter(usize),
  Commutator(Box<Bracket>, Box<Bracket>),
}

impl Bracket {
  /// The standard bracketing of a Lyndon word.

  pub fn of(word: &[usize]) -> Self {
    if word.len() == 1 {
      Self::Letter(word[0])
    } else {
      let (u, v) = standard_factorization(word);
      Self::Commutator(Box::new(Self::of(u)), Box::new(Self::of(v)))
    }
  }

  /// Number of letters in this bracket.

  pub fn degree(&self) -> usize {
    match self {
      Self::Letter(_) => 1,
      Self::Commutator(u, v) => u.degree() + v.degree(),
    }
  }
}

impl std::fmt::Display for Bracket {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match self {
      Self::Letter(letter) => write!(f, "{letter}"),
      Self::Commutator(u, v) => write!(f, "[{u},{v}]"),
    }
  }
}


/// The standard bracketings of all Lyndon words of length `1..=depth`,
/// in the order of [lyndon_words].

pub fn lyndon_brackets(channels: usize, depth: usize) -> Vec<Bracket> {
  lyndon_words(channels, depth)
    .iter()
    .map(|word| Bracket::of(word) )
    .collect()
}


// Sparse polynomial over words of a single length, keyed by index within that level
type Expansion = HashMap<usize, i64>;

fn expand_bracket(word: &[usize], channels: usize, memo: &mut HashMap<Word, Arc<Expansion>>) -> Arc<Expansion> {
  if let Some(known) = memo.get(word) { return known.clone() }
  let out = if word.len() == 1 {
    Expansion::from([(word[0], 1)])
  } else {
    let (u, v) = standard_factorization(word);
    let pu = expand_bracket(u, channels, memo);
    let pv = expand_bracket(v, channels, memo);
    let size_u = channels.pow(u.len() as u32);
    let size_v = channels.pow(v.len() as u32);
    let mut out = Expansion::new();
    for (&iu, &cu) in pu.iter() {
      for (&iv, &cv) in pv.iter() {
        *out.entry(iu * size_v + iv).or_insert(0) += cu * cv;
        *out.entry(iv * size_u + iu).or_insert(0) -= cu * cv;
      }
    }
    out.retain(|_, c| *c != 0 );
    out
  };
  let out = Arc::new(out);
  memo.insert(word.to_vec(), out.clone());
  out
}


/// Index tables relating a signature to its Lyndon coordinates.
///
/// `indices` locates every Lyndon word inside the flat signature layout.
/// `transforms` is an ordered list of sparse updates
/// `v[target] -= coefficient * v[source]` over positions in the Lyndon
/// ordering, which turns Lyndon word coordinates of a log-signature into
/// coordinates in the Lyndon bracket basis. It is the forward substitution
/// of the unit lower triangular matrix `M[u][w] = <P_w, u>`, where `P_w` is
/// the expansion of `w`'s standard bracketing.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyndonBasis {
  channels: usize,
  depth: usize,
  words: Vec<Word>,
  indices: Vec<usize>,
  transforms: Vec<(usize, usize, i64)>,
}

impl LyndonBasis {
  pub fn new(channels: usize, depth: usize) -> Self {
    let algebra = Algebra::new(channels, depth);
    let words = lyndon_words(channels, depth);
    let indices: Vec<usize> = words.iter().map(|word| algebra.word_index(word) ).collect();
    let positions: HashMap<usize, usize> = indices.iter()
      .enumerate()
      .map(|(position, &index)| (index, position) )
      .collect();
    let mut memo = HashMap::new();
    let mut transforms = vec![];
    for (source, word) in words.iter().enumerate() {
      if word.len() < 2 { continue }
      let offset = algebra.level(word.len()).start;
      let expansion = expand_bracket(word, channels, &mut memo);
      debug_assert_eq!(expansion.get(&(indices[source] - offset)), Some(&1));
      for (&index, &coefficient) in expansion.iter() {
        match positions.get(&(index + offset)) {
          Some(&target) if target != source => {
            debug_assert!(target > source);
            transforms.push((source, target, coefficient));
          },
          _ => {},
        }
      }
    }
    transforms.sort_by_key(|&(source, target, _)| (target, source) );
    Self { channels, depth, words, indices, transforms }
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn size(&self) -> usize {
    self.words.len()
  }

  pub fn words(&self) -> &[Word] {
    &self.words
  }

  pub fn indices(&self) -> &[usize] {
    &self.indices
  }

  pub fn transforms(&self) -> &[(usize, usize, i64)] {
    &self.transforms
  }

  /// Pick the Lyndon coordinates out of a flat signature-shaped element.

  pub fn gather<T: Real>(&self, source: &[T], out: &mut [T]) {
    for (value, &index) in out.iter_mut().zip(&self.indices) {
      *value = source[index];
    }
  }

  /// Adjoint of [gather](LyndonBasis::gather), accumulating into `out`.

  pub fn scatter_add<T: Real>(&self, grad: &[T], out: &mut [T]) {
    for (&g, &index) in grad.iter().zip(&self.indices) {
      out[index] += g;
    }
  }

  /// Convert Lyndon word coordinates to bracket coordinates in place.

  pub fn to_brackets<T: Real>(&self, coordinates: &mut [T]) {
    for &(source, target, coefficient) in &self.transforms {
      let delta = T::from(coefficient).unwrap() * coordinates[source];
      coordinates[target] -= delta;
    }
  }

  /// Adjoint of [to_brackets](LyndonBasis::to_brackets), applied in place
  /// to a gradient.

  pub fn to_brackets_backward<T: Real>(&self, grad: &mut [T]) {
    for &(source, target, coefficient) in self.transforms.iter().rev() {
      let delta = T::from(coefficient).unwrap() * grad[target];
      grad[source] -= delta;
    }
  }
}


/// Shared store of [LyndonBasis] tables, built once per `(channels, depth)`.

#[derive(Debug, Default)]
pub struct BasisCache {
  bases: RwLock<HashMap<(usize, usize), Arc<LyndonBasis>>>,
}

impl BasisCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, channels: usize, depth: usize) -> Arc<LyndonBasis> {
    if let Some(basis) = self.bases.read().get(&(channels, depth)) {
      return basis.clone()
    }
    self.bases.write()
      .entry((channels, depth))
      .or_insert_with(|| {
        tracing::debug!(channels, depth, "building Lyndon basis");
        Arc::new(LyndonBasis::new(channels, depth))
      })
      .clone()
  }

  pub fn len(&self) -> usize {
    self.bases.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    self.bases.write().clear();
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn words() {
    assert_eq!(all_words(2, 2), vec![vec![0], vec![1], vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    assert_eq!(all_words(3, 3).len(), 39);
  }

  #[test]
  fn lyndon() {
    assert!(is_lyndon(&[0, 0, 1]));
    assert!(is_lyndon(&[0, 1, 1]));
    assert!(!is_lyndon(&[0, 1, 0]));
    assert!(!is_lyndon(&[1, 1]));
    assert_eq!(lyndon_words(2, 4), vec![
      vec![0], vec![1],
      vec![0, 1],
      vec![0, 0, 1], vec![0, 1, 1],
      vec![0, 0, 0, 1], vec![0, 0, 1, 1], vec![0, 1, 1, 1],
    ]);
    assert_eq!(lyndon_words(1, 5), vec![vec![0]]);
  }

  #[test]
  fn witt_formula() {
    for channels in 1..5 {
      for depth in 1..6 {
        assert_eq!(logsignature_channels(channels, depth), lyndon_words(channels, depth).len());
      }
    }
    assert_eq!(logsignature_channels(3, 3), 14);
    assert_eq!(logsignature_channels(2, 4), 8);
  }

  #[test]
  fn brackets() {
    assert_eq!(standard_factorization(&[0, 1, 2]), (&[0][..], &[1, 2][..]));
    assert_eq!(standard_factorization(&[0, 2, 1]), (&[0, 2][..], &[1][..]));
    let brackets: Vec<String> = lyndon_brackets(2, 3).iter().map(|b| b.to_string() ).collect();
    assert_eq!(brackets, vec!["0", "1", "[0,1]", "[0,[0,1]]", "[[0,1],1]"]);
    assert_eq!(Bracket::of(&[0, 0, 1, 1]).degree(), 4);
  }

  #[test]
  fn expansion() {
    let mut memo = HashMap::new();
    // [0,[1,2]] = 012 - 021 - 120 + 210
    let p = expand_bracket(&[0, 1, 2], 3, &mut memo);
    assert_eq!(p.len(), 4);
    assert_eq!(p[&5], 1);
    assert_eq!(p[&7], -1);
    assert_eq!(p[&15], -1);
    assert_eq!(p[&21], 1);
  }

  #[test]
  fn three_channel_correction() {
    // The only correction at this size: brackets[10] = words[10] + words[9]
    let basis = LyndonBasis::new(3, 3);
    assert_eq!(basis.size(), 14);
    assert_eq!(basis.transforms(), &[(9, 10, -1)]);
    let mut coordinates: Vec<f64> = (0..14).map(|i| i as f64 ).collect();
    basis.to_brackets(&mut coordinates);
    assert_eq!(coordinates[10], 19.0);
    assert_eq!(coordinates[9], 9.0);
  }

  #[test]
  fn small_depths_need_no_correction() {
    for channels in 1..6 {
      assert!(LyndonBasis::new(channels, 2).transforms().is_empty());
    }
  }

  #[test]
  fn transform_adjoint() {
    let basis = LyndonBasis::new(2, 5);
    assert!(!basis.transforms().is_empty());
    let x: Vec<f64> = (0..basis.size()).map(|i| (i as f64 * 0.37).sin() ).collect();
    let g: Vec<f64> = (0..basis.size()).map(|i| (i as f64 * 0.91).cos() ).collect();
    let mut tx = x.clone();
    basis.to_brackets(&mut tx);
    let mut tg = g.clone();
    basis.to_brackets_backward(&mut tg);
    let lhs: f64 = tx.iter().zip(&g).map(|(a, b)| a * b ).sum();
    let rhs: f64 = x.iter().zip(&tg).map(|(a, b)| a * b ).sum();
    assert!((lhs - rhs).abs() < 1e-12);
  }

  #[test]
  fn cache() {
    let cache = BasisCache::new();
    let a = cache.get(3, 3);
    let b = cache.get(3, 3);
    assert!(Arc::ptr_eq(&a, &b));
    cache.get(2, 3);
    assert_eq!(cache.len(), 2);
  }
}
