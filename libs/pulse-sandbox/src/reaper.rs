/// Resource Reaper
///
/// Unconditional, best-effort teardown of everything an execution put into
/// the runtime: its container, its image, and garbage earlier executions left
/// behind (containers created but never started, dangling sandbox images).
///
/// Nothing here returns an error to the pipeline. Failures are collected in a
/// [`CleanupReport`] and logged; the execution's verdict is already decided.

use crate::error::CleanupError;
use crate::runtime::ContainerRuntime;
use pulse_common::config::SANDBOX_LABEL;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failures: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.failures.extend(other.failures);
    }

    fn record(&mut self, kind: &'static str, target: &str, result: Result<(), crate::error::RuntimeError>) {
        match result {
            Ok(()) => {
                debug!(kind, target, "Removed");
                self.removed.push(target.to_string());
            }
            Err(e) => {
                let failure = CleanupError {
                    kind,
                    target: target.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %failure, "Cleanup step failed");
                self.failures.push(failure);
            }
        }
    }
}

#[derive(Clone)]
pub struct Reaper {
    runtime: Arc<dyn ContainerRuntime>,
    stale_grace: Duration,
}

impl Reaper {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, stale_grace: Duration) -> Self {
        Self { runtime, stale_grace }
    }

    /// Force-remove `id`, then sweep stale never-started sandbox containers
    pub async fn cleanup_container(&self, id: &str) -> CleanupReport {
        let mut report = CleanupReport::default();
        report.record("container", id, self.runtime.remove_container(id).await);
        report.merge(self.sweep_created_containers(Some(id)).await);
        report
    }

    /// Force-remove `tag`, then sweep dangling sandbox images
    pub async fn cleanup_image(&self, tag: &str) -> CleanupReport {
        let mut report = CleanupReport::default();
        report.record("image", tag, self.runtime.remove_image(tag, true).await);
        report.merge(self.sweep_dangling_images().await);
        report
    }

    /// Maintenance pass without a specific execution
    pub async fn sweep(&self) -> CleanupReport {
        let mut report = self.sweep_created_containers(None).await;
        report.merge(self.sweep_dangling_images().await);
        info!(
            removed = report.removed.len(),
            failures = report.failures.len(),
            "Sweep complete"
        );
        report
    }

    async fn sweep_created_containers(&self, already_removed: Option<&str>) -> CleanupReport {
        let mut report = CleanupReport::default();

        let containers = match self.runtime.list_created_containers(SANDBOX_LABEL).await {
            Ok(containers) => containers,
            Err(e) => {
                report.record("container list", SANDBOX_LABEL, Err(e));
                return report;
            }
        };

        // Younger containers may belong to an execution between create and start
        let cutoff = unix_now() - self.stale_grace.as_secs() as i64;

        for container in containers {
            if Some(container.id.as_str()) == already_removed || container.created > cutoff {
                continue;
            }
            let result = self.runtime.remove_container(&container.id).await;
            report.record("container", &container.id, result);
        }

        report
    }

    async fn sweep_dangling_images(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let images = match self.runtime.list_dangling_images(SANDBOX_LABEL).await {
            Ok(images) => images,
            Err(e) => {
                report.record("image list", SANDBOX_LABEL, Err(e));
                return report;
            }
        };

        for image in images {
            // Not forced: layers still backing a live container are skipped
            let result = self.runtime.remove_image(&image, false).await;
            report.record("image", &image, result);
        }

        report
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Removes its resource when dropped unless [`release`](Self::release) ran first.
///
/// `release` awaits the removal, so the normal and error paths finish teardown
/// before returning. The `Drop` path covers panics and dropped futures by
/// spawning the removal on the current tokio runtime.
struct Guard {
    reaper: Reaper,
    target: Option<GuardTarget>,
}

enum GuardTarget {
    Container(String),
    Image(String),
}

impl Guard {
    async fn release(mut self) -> CleanupReport {
        match self.target.take() {
            Some(GuardTarget::Container(id)) => self.reaper.cleanup_container(&id).await,
            Some(GuardTarget::Image(tag)) => self.reaper.cleanup_image(&tag).await,
            None => CleanupReport::default(),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        let Some(target) = self.target.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available for deferred cleanup; resource may leak until the next sweep");
            return;
        };

        let reaper = self.reaper.clone();
        handle.spawn(async move {
            match target {
                GuardTarget::Container(id) => {
                    warn!(container_id = %id, "Removing container after abandoned execution");
                    reaper.cleanup_container(&id).await;
                }
                GuardTarget::Image(tag) => {
                    warn!(tag = %tag, "Removing image after abandoned execution");
                    reaper.cleanup_image(&tag).await;
                }
            }
        });
    }
}

/// Guarantees removal of the execution container
pub struct ContainerGuard(Guard);

impl ContainerGuard {
    pub fn new(reaper: Reaper, container_id: String) -> Self {
        Self(Guard {
            reaper,
            target: Some(GuardTarget::Container(container_id)),
        })
    }

    pub async fn release(self) -> CleanupReport {
        self.0.release().await
    }
}

/// Guarantees removal of the execution image
pub struct ImageGuard(Guard);

impl ImageGuard {
    pub fn new(reaper: Reaper, tag: String) -> Self {
        Self(Guard {
            reaper,
            target: Some(GuardTarget::Image(tag)),
        })
    }

    pub async fn release(self) -> CleanupReport {
        self.0.release().await
    }
}
