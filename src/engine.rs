use crate::{
  config::{ EngineConfig, SigOptions, Strategy },
  logsignature::{ self, LogSignatureMode },
  lyndon::BasisCache,
  parallel,
  signature::{ signature_op, Kernel, SigSpec },
  variable::Variable,
  scalar::Real,
  error::{ Result, SigError },
};


/// Entry point for signature computations.
///
/// Owns the configuration and a cache of Lyndon bases, which lives as long
/// as the engine. Engines are cheap to create but worth sharing when
/// log-signatures get computed repeatedly.
///
/// ```
/// use microsig::{ Engine, EngineConfig, SigOptions, Strategy, Tensor };
///
/// let engine = Engine::new(EngineConfig { strategy: Strategy::Sequential, ..EngineConfig::default() });
/// let path = Tensor::<f64>::randn(&[4, 10, 3]).trained();
/// let sig = engine.signature(&path, 3, &SigOptions::new()).unwrap();
/// assert_eq!(sig.dims(), &[4, 39]);
/// ```

#[derive(Debug, Default)]
pub struct Engine {
  config: EngineConfig,
  bases: BasisCache,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self { config, bases: BasisCache::new() }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn bases(&self) -> &BasisCache {
    &self.bases
  }

  /// Signature of a batch of paths of shape `(batch, length, channels)`,
  /// truncated at `depth`.
  ///
  /// The result has shape `(batch, signature_channels)`, or
  /// `(batch, increments, signature_channels)` when streaming. It is
  /// recorded in the computation graph, so gradients reach the path,
  /// an explicit basepoint and the initial signature.

  pub fn signature<T: Real>(&self, path: &Variable<T>, depth: usize, options: &SigOptions<T>) -> Result<Variable<T>> {
    let spec = SigSpec::validate(
      path.tensor(),
      depth,
      &options.basepoint.as_ref().map(|point| point.tensor().clone() ),
      options.initial.as_ref().map(|initial| initial.tensor() ),
      options.stream,
      options.inverse,
    )?;
    let requested = options.strategy.unwrap_or(self.config.strategy);
    let strategy = parallel::choose(
      &self.config,
      requested,
      spec.batch,
      spec.increments(),
      spec.signature_channels(),
      spec.stream,
    );
    tracing::debug!(?requested, ?strategy, batch = spec.batch, increments = spec.increments(), "dispatching signature");
    let initial = options.initial.as_ref();
    match strategy {
      Strategy::BatchTrick => {
        if options.stream { return Err(SigError::StreamingUnsupported) }
        parallel::batch_trick(path, depth, &options.basepoint, initial, options.inverse, self.config.chunks)
      },
      Strategy::ThreadParallel if !options.stream => {
        let kernel = Kernel::Threaded { workers: self.config.workers };
        signature_op(path, depth, &options.basepoint, initial, false, options.inverse, kernel)
      },
      _ => {
        if strategy == Strategy::ThreadParallel {
          tracing::debug!("streamed output is computed sequentially");
        }
        signature_op(path, depth, &options.basepoint, initial, options.stream, options.inverse, Kernel::Sequential)
      },
    }
  }

  /// Log-signature of a batch of paths, in the given encoding.
  ///
  /// The mode is checked against the number of channels before any
  /// signature gets computed.

  pub fn logsignature<T: Real>(
    &self,
    path: &Variable<T>,
    depth: usize,
    mode: LogSignatureMode,
    options: &SigOptions<T>,
  ) -> Result<Variable<T>> {
    let channels = path.dims().last().copied().unwrap_or(0);
    if mode == LogSignatureMode::Brackets && channels == 1 {
      return Err(SigError::ModeUnsupported { mode, channels })
    }
    let signature = self.signature(path, depth, options)?;
    logsignature::signature_to_logsignature(&signature, channels, depth, mode, options.stream, &self.bases)
  }

  /// Log-signature of an already computed signature, using this engine's
  /// basis cache.

  pub fn signature_to_logsignature<T: Real>(
    &self,
    signature: &Variable<T>,
    channels: usize,
    depth: usize,
    mode: LogSignatureMode,
    stream: bool,
  ) -> Result<Variable<T>> {
    logsignature::signature_to_logsignature(signature, channels, depth, mode, stream, &self.bases)
  }
}
