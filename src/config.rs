use serde::{ Serialize, Deserialize };

use crate::{
  signature::Basepoint,
  variable::Variable,
  scalar::Real,
};


/// How a signature gets evaluated.
///
/// All strategies produce the same values and gradients up to
/// floating point tolerance.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
  /// Pick one of the others based on the shape of the input.
  #[default]
  Auto,
  /// Multiply all increments of a batch element left to right.
  Sequential,
  /// Split each batch element into contiguous segments, computed on scoped
  /// threads and reduced in order. Streaming falls back to [Strategy::Sequential].
  ThreadParallel,
  /// Cut the path into overlapping pieces, treat those as an artificial batch
  /// and recombine their signatures. Cannot stream.
  BatchTrick,
}


/// Configuration of an [Engine](crate::Engine).
///
/// Missing fields take their default values when deserializing.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub strategy: Strategy,
  /// Segments per batch element with [Strategy::ThreadParallel].
  pub workers: usize,
  /// Pieces per batch element with [Strategy::BatchTrick].
  pub chunks: usize,
  /// Below this many `increments * signature_channels` per batch element,
  /// [Strategy::Auto] stays sequential.
  pub min_parallel_work: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    let workers = std::thread::available_parallelism()
      .map(|n| n.get() )
      .unwrap_or(1);
    Self {
      strategy: Strategy::Auto,
      workers,
      chunks: workers,
      min_parallel_work: 1 << 16,
    }
  }
}


/// Per-call options of a signature or log-signature computation.

#[derive(Debug, Clone)]
pub struct SigOptions<T: Real> {
  pub basepoint: Basepoint<Variable<T>>,
  pub initial: Option<Variable<T>>,
  pub stream: bool,
  pub inverse: bool,
  /// Overrides the engine's configured strategy.
  pub strategy: Option<Strategy>,
}

impl<T: Real> Default for SigOptions<T> {
  fn default() -> Self {
    Self {
      basepoint: Basepoint::None,
      initial: None,
      stream: false,
      inverse: false,
      strategy: None,
    }
  }
}

impl<T: Real> SigOptions<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn basepoint(mut self, point: &Variable<T>) -> Self {
    self.basepoint = Basepoint::Point(point.clone());
    self
  }

  pub fn zero_basepoint(mut self) -> Self {
    self.basepoint = Basepoint::Zero;
    self
  }

  pub fn initial(mut self, initial: &Variable<T>) -> Self {
    self.initial = Some(initial.clone());
    self
  }

  pub fn stream(mut self, stream: bool) -> Self {
    self.stream = stream;
    self
  }

  pub fn inverse(mut self, inverse: bool) -> Self {
    self.inverse = inverse;
    self
  }

  pub fn strategy(mut self, strategy: Strategy) -> Self {
    self.strategy = Some(strategy);
    self
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_config() {
    let config: EngineConfig = serde_json::from_str(r#"{ "strategy": "batch_trick", "chunks": 3 }"#).unwrap();
    assert_eq!(config.strategy, Strategy::BatchTrick);
    assert_eq!(config.chunks, 3);
    assert_eq!(config.workers, EngineConfig::default().workers);
  }

  #[test]
  fn strategy_names() {
    assert_eq!(serde_json::to_string(&Strategy::ThreadParallel).unwrap(), r#""thread_parallel""#);
    assert_eq!(serde_json::from_str::<Strategy>(r#""auto""#).unwrap(), Strategy::Auto);
  }

  #[test]
  fn options() {
    let options = SigOptions::<f64>::new().zero_basepoint().stream(true).strategy(Strategy::Sequential);
    assert_eq!(options.basepoint, Basepoint::Zero);
    assert!(options.stream && !options.inverse);
    assert_eq!(options.strategy, Some(Strategy::Sequential));
  }
}
