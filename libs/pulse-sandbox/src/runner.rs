/// Container Runner
///
/// Creates the single execution container, starts it, and waits for it to
/// stop under a hard deadline. Three outcomes race:
/// - the container stops: its combined output is retrieved
/// - the wait itself fails: run error
/// - the deadline passes: the container is stopped, timeout error
///
/// On every one of those paths the container is force-removed before `run`
/// returns. A guard covers panics and dropped futures.

use crate::context::BuildContext;
use crate::error::SandboxError;
use crate::image::sandbox_labels;
use crate::reaper::{ContainerGuard, Reaper};
use crate::runtime::{ContainerRuntime, ContainerSpec};
use pulse_common::config::{SandboxConfig, CONTAINER_WORKDIR};
use pulse_common::types::Language;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Lines of output kept in a run error message
const ERROR_TAIL_LINES: usize = 20;

pub struct ContainerRunner {
    runtime: Arc<dyn ContainerRuntime>,
    reaper: Reaper,
    memory_limit_bytes: i64,
    nano_cpus: i64,
    deadline: Duration,
}

impl ContainerRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, reaper: Reaper, config: &SandboxConfig) -> Self {
        Self {
            runtime,
            reaper,
            memory_limit_bytes: config.memory_limit_bytes,
            nano_cpus: config.nano_cpus(),
            deadline: config.execution_timeout,
        }
    }

    pub fn container_spec(&self, image: &str, context: &BuildContext, language: Language, name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: image.to_string(),
            mount_source: context.path().to_path_buf(),
            mount_target: CONTAINER_WORKDIR.to_string(),
            memory_limit_bytes: self.memory_limit_bytes,
            nano_cpus: self.nano_cpus,
            labels: sandbox_labels(language),
        }
    }

    /// Run `image` to completion and return its combined stdout and stderr
    #[instrument(skip(self, context), fields(deadline_ms = self.deadline.as_millis() as u64))]
    pub async fn run(
        &self,
        image: &str,
        context: &BuildContext,
        language: Language,
        container_name: &str,
    ) -> Result<Vec<u8>, SandboxError> {
        let spec = self.container_spec(image, context, language, container_name);

        let container_id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| SandboxError::Run(format!("failed to create container: {}", e)))?;

        // Armed immediately after creation so no path can skip removal
        let guard = ContainerGuard::new(self.reaper.clone(), container_id.clone());

        let outcome = self.drive(&container_id).await;

        let cleanup = guard.release().await;
        if !cleanup.is_clean() {
            warn!(container_id = %container_id, failures = cleanup.failures.len(), "Container cleanup incomplete");
        }

        outcome
    }

    async fn drive(&self, container_id: &str) -> Result<Vec<u8>, SandboxError> {
        let start = Instant::now();

        self.runtime
            .start_container(container_id)
            .await
            .map_err(|e| SandboxError::Run(format!("failed to start container: {}", e)))?;

        let exit_code = match tokio::time::timeout(self.deadline, self.runtime.wait_container(container_id)).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                return Err(SandboxError::Run(format!("error while waiting for container: {}", e)));
            }
            Err(_) => {
                warn!(
                    container_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Execution timed out, stopping container"
                );
                if let Err(e) = self.runtime.stop_container(container_id).await {
                    warn!(container_id, error = %e, "Failed to stop timed-out container");
                }
                return Err(SandboxError::Timeout(self.deadline));
            }
        };

        let execution_ms = start.elapsed().as_millis() as u64;
        debug!(container_id, exit_code, execution_ms, "Container stopped");

        let output = self
            .runtime
            .container_logs(container_id)
            .await
            .map_err(|e| SandboxError::Run(format!("failed to read container logs: {}", e)))?;

        if exit_code != 0 {
            warn!(container_id, exit_code, "Program exited with failure");
            return Err(SandboxError::Run(describe_exit(exit_code, &output)));
        }

        info!(container_id, execution_ms, output_bytes = output.len(), "Execution completed");
        Ok(output)
    }
}

fn describe_exit(exit_code: i64, output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(ERROR_TAIL_LINES)..].join("\n");

    let mut message = format!("program exited with status {}", exit_code);
    match exit_code {
        137 => message.push_str(" (killed: likely exceeded the memory limit)"),
        139 => message.push_str(" (segmentation fault)"),
        _ => {}
    }
    if !tail.is_empty() {
        message.push_str(":\n");
        message.push_str(&tail);
    }
    message
}
