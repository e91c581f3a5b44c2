//! Single-use execution sandbox: harness generation, image build, bounded
//! container run, output normalization and guaranteed teardown.

pub mod context;
pub mod docker;
pub mod error;
pub mod executor;
pub mod harness;
pub mod image;
pub mod language;
pub mod normalizer;
pub mod reaper;
pub mod runner;
pub mod runtime;

#[cfg(test)]
mod mock;

pub use docker::DockerManager;
pub use error::{CleanupError, RuntimeError, SandboxError};
pub use executor::Sandbox;
pub use runtime::ContainerRuntime;
