// Container runtime seam: the operations the pipeline needs from a daemon
use crate::error::RuntimeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// Image build from an in-memory tar of the build context
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub tag: String,
    pub dockerfile: String,
    pub context_tar: Vec<u8>,
    pub labels: HashMap<String, String>,
}

/// Everything needed to create the single execution container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub mount_source: PathBuf,
    pub mount_target: String,
    pub memory_limit_bytes: i64,
    pub nano_cpus: i64,
    pub labels: HashMap<String, String>,
}

/// A container that was created but never started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub id: String,
    /// Unix seconds
    pub created: i64,
}

/// The subset of a container runtime the sandbox drives.
///
/// One long-lived implementation is shared by every execution; it must be
/// safe to call concurrently.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build and tag an image, draining progress until the daemon reports an outcome
    async fn build_image(&self, request: BuildRequest) -> Result<(), RuntimeError>;

    /// Returns the new container's id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Resolves once the container is no longer running, with its exit code
    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Combined stdout and stderr in arrival order
    async fn container_logs(&self, id: &str) -> Result<Vec<u8>, RuntimeError>;

    /// Force removal, including anonymous volumes
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Containers in the `created` state carrying `label`
    async fn list_created_containers(&self, label: &str) -> Result<Vec<CreatedContainer>, RuntimeError>;

    async fn remove_image(&self, name: &str, force: bool) -> Result<(), RuntimeError>;

    /// Ids of dangling images carrying `label`
    async fn list_dangling_images(&self, label: &str) -> Result<Vec<String>, RuntimeError>;
}
