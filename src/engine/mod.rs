//! Engine Client Adapter (C3): the only module that talks to the container
//! engine directly. Everything else in the crate goes through the
//! [`EngineClient`] trait, which keeps the pool/evaluator/image-builder
//! testable against a fake engine (see `tests/` and the `mockall`-generated
//! mock used in unit tests).

mod bollard_client;

pub use bollard_client::BollardEngine;

use async_trait::async_trait;

use crate::config::LanguageConfig;
use crate::error::Result;

/// Options for a single exec invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub user: Option<String>,
    pub workdir: Option<String>,
    /// If false, the exec is fire-and-forget: stdout/stderr are not attached
    /// and the returned buffers are always empty (used for mkdir/chmod/rm).
    pub attach_output: bool,
}

/// Demultiplexed output of a completed exec.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The subset of container-engine operations the service needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Stream a tar-packed build context to the engine and block until the
    /// image is confirmed to exist under `tag`.
    async fn build_image(&self, context_tar: Vec<u8>, tag: &str) -> Result<()>;

    /// Create a container named `name` from `image` with `limits` applied,
    /// then start it. Mirrors §4.3: user `1000:1000`, working dir `/tmp/`,
    /// pseudo-TTY on, network disabled, entrypoint `/bin/sh`, auto-remove on.
    async fn create_and_start_container(
        &self,
        name: &str,
        image: &str,
        limits: LanguageConfig,
    ) -> Result<()>;

    /// Create + start (and optionally attach) an exec inside `container`.
    async fn exec(&self, container: &str, cmd: Vec<String>, opts: ExecOptions) -> Result<ExecOutput>;

    /// List running, service-owned containers whose name starts with `prefix`.
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>>;

    /// Send the engine's default kill signal to a container.
    async fn kill_container(&self, name: &str) -> Result<()>;
}
