//! Differentiable path signatures and log-signatures.
//! Tiny. Few dependencies. CPU only.
//!
//! # Features
//!
//! - **Signatures** — Truncated tensor-algebra signatures of batched paths via
//! Chen's identity, with optional basepoints and initial signatures to continue from.
//!
//! - **Log-signatures** — Three encodings: Lyndon words, the full expanded logarithm
//! and coordinates in the Lyndon bracket basis, derived for any number of channels and depth.
//!
//! - **Streaming** — The signature of every prefix of a path in a single pass.
//!
//! - **Inversion** — Signatures of time-reversed paths, without reversing any data.
//!
//! - **Gradients** — Every operation is recorded in a computation graph, so gradients
//! flow back to paths, basepoints and initial signatures.
//!
//! - **Parallelism** — Long paths get split across threads or folded into an artificial
//! batch. All strategies agree up to floating point tolerance.
//!
//! # Examples
//!
//! Signature and gradient of a random path:
//! ```
//! use microsig::{ ops::*, Tensor, SigOptions };
//!
//! // Batch of 4 paths with 10 points in 3 dimensions
//! let path = Tensor::<f64>::randn(&[4, 10, 3]).trained();
//!
//! // Signature truncated at depth 3
//! let sig = microsig::signature(&path, 3, &SigOptions::new()).unwrap();
//! assert_eq!(sig.dims(), &[4, 39]);
//!
//! // Back-prop some scalar
//! sig.sum().backward().unwrap();
//! assert_eq!(path.grad().unwrap().dims(), &[4, 10, 3]);
//! ```
//!
//! Streamed log-signatures from the origin:
//! ```
//! use microsig::{ Tensor, SigOptions, LogSignatureMode };
//!
//! let path = Tensor::<f64>::randn(&[4, 10, 3]).tracked();
//! let options = SigOptions::new().zero_basepoint().stream(true);
//! let logsig = microsig::logsignature(&path, 3, LogSignatureMode::Words, &options).unwrap();
//! assert_eq!(logsig.dims(), &[4, 10, 14]);
//! ```
//!
//! ## More examples
//! Check the `/demos` folder for more example code.
//!
//!
//! # Optional features
//!
//! Some features can be toggled in your `Cargo.toml`.
//!
//! - `unsafe` *(default)* — Accelerated tensor products using [matrixmultiply] crate.
//! - `threading` *(default)* — Thread-parallel evaluation of long paths.
//! - `rayon` — Process batch elements in parallel with [rayon].

mod internal;
mod shape;
mod tensor;
mod variable;

pub mod ops;
pub mod scalar;
pub mod error;
pub mod algebra;
pub mod lyndon;
pub mod signature;
pub mod logsignature;
pub mod combine;
pub mod parallel;
pub mod config;
mod engine;
mod path;

pub use shape::Shape;
pub use tensor::Tensor;
pub use variable::{ Variable, UnaryOp, BinaryOp, MultiOp };
pub use error::{ SigError, Result };
pub use algebra::signature_channels;
pub use lyndon::{ all_words, lyndon_words, lyndon_brackets, logsignature_channels, Bracket, LyndonBasis, BasisCache };
pub use signature::{ Basepoint, SigSpec, GradientRecord, Gradients };
pub use logsignature::{ LogSignatureMode, logsignature_dim, signature_to_logsignature };
pub use combine::{ signature_combine, multi_signature_combine, extract_signature_term };
pub use config::{ EngineConfig, SigOptions, Strategy };
pub use engine::Engine;
pub use path::Path;

use scalar::Real;


/// Signature of a batch of paths of shape `(batch, length, channels)`,
/// truncated at `depth`, using a default [Engine].

pub fn signature<T: Real>(path: &Variable<T>, depth: usize, options: &SigOptions<T>) -> Result<Variable<T>> {
  Engine::default().signature(path, depth, options)
}

/// Log-signature of a batch of paths in the given encoding, using a
/// default [Engine].

pub fn logsignature<T: Real>(
  path: &Variable<T>,
  depth: usize,
  mode: LogSignatureMode,
  options: &SigOptions<T>,
) -> Result<Variable<T>> {
  Engine::default().logsignature(path, depth, mode, options)
}
