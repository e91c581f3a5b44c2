/// Sandbox Pipeline - One-Shot Execution
///
/// **Flow:**
/// 1. Resolve the language (unknown values stop here, nothing touched)
/// 2. Generate the harness for the cases in scope (harness.rs)
/// 3. Materialize the build context (context.rs)
/// 4. Build the execution image (image.rs)
/// 5. Run one container under the deadline (runner.rs)
/// 6. Normalize output into verdicts (normalizer.rs)
///
/// The first failing stage decides the error. Teardown of the container,
/// the image and the context runs on every path and never changes it.

use crate::context::BuildContext;
use crate::docker::DockerManager;
use crate::error::{RuntimeError, SandboxError};
use crate::harness;
use crate::image::{image_tag, ImageBuilder};
use crate::normalizer;
use crate::reaper::{CleanupReport, ImageGuard, Reaper};
use crate::runner::ContainerRunner;
use crate::runtime::ContainerRuntime;
use chrono::Utc;
use pulse_common::config::{SandboxConfig, PRODUCT_NAME};
use pulse_common::types::{ExecutionReport, ExecutionRequest, ExecutionStatus, Language, TestVerdict};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Length of the per-execution token in image and container names
const TOKEN_LEN: usize = 12;

pub struct Sandbox {
    config: SandboxConfig,
    builder: ImageBuilder,
    runner: ContainerRunner,
    reaper: Reaper,
}

impl Sandbox {
    /// Sandbox over an existing runtime client, shared by every execution
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        let reaper = Reaper::new(runtime.clone(), config.stale_grace);
        Self {
            builder: ImageBuilder::new(runtime.clone()),
            runner: ContainerRunner::new(runtime, reaper.clone(), &config),
            reaper,
            config,
        }
    }

    /// Sandbox backed by the local Docker daemon
    pub fn connect_local(config: SandboxConfig) -> Result<Self, RuntimeError> {
        let docker = DockerManager::connect_local()?;
        Ok(Self::new(Arc::new(docker), config))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Remove stale sandbox containers and dangling sandbox images
    pub async fn sweep(&self) -> CleanupReport {
        self.reaper.sweep().await
    }

    /// Run `request` and return one verdict per test case in scope, in order
    #[instrument(
        skip(self, request),
        fields(language = %request.language, mode = %request.mode, cases = request.test_cases.len())
    )]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<TestVerdict>, SandboxError> {
        let language: Language = request.language.parse()?;
        let cases = request.mode.select(&request.test_cases);

        let program = harness::generate(language, cases, request.snippet.as_deref(), &request.code);

        let token = execution_token();
        let context = BuildContext::materialize(language, &program)?;
        let tag = image_tag(self.config.tag_policy, language, &token);
        let container_name = format!("{}-{}-container-{}", PRODUCT_NAME, language, token);

        // Armed before the build: a failed build can still leave a tagged image
        let image_guard = ImageGuard::new(self.reaper.clone(), tag.clone());

        let outcome = self.build_and_run(&context, language, &tag, &container_name).await;

        let cleanup = image_guard.release().await;
        if !cleanup.is_clean() {
            warn!(tag = %tag, failures = cleanup.failures.len(), "Image cleanup incomplete");
        }
        context.release();

        let output = outcome?;
        let verdicts = normalizer::normalize(&output)?;

        if verdicts.len() != cases.len() {
            return Err(SandboxError::OutputParse(format!(
                "expected {} results, program printed {}",
                cases.len(),
                verdicts.len()
            )));
        }

        info!(
            passed = verdicts.iter().filter(|v| v.passed).count(),
            total = verdicts.len(),
            "Execution evaluated"
        );
        Ok(verdicts)
    }

    async fn build_and_run(
        &self,
        context: &BuildContext,
        language: Language,
        tag: &str,
        container_name: &str,
    ) -> Result<Vec<u8>, SandboxError> {
        self.builder.build(context, language, tag).await?;
        self.runner.run(tag, context, language, container_name).await
    }

    /// [`execute`](Self::execute) folded into a caller-facing report
    pub async fn report(&self, request: &ExecutionRequest) -> ExecutionReport {
        let start = Instant::now();

        let (status, results, error) = match self.execute(request).await {
            Ok(results) => (ExecutionStatus::Success, results, None),
            Err(e) => {
                warn!(language = %request.language, status = %e.status(), error = %e, "Execution failed");
                (e.status(), Vec::new(), Some(e.to_string()))
            }
        };

        ExecutionReport {
            id: Uuid::new_v4(),
            language: request.language.clone(),
            mode: request.mode,
            status,
            results,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        }
    }
}

fn execution_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}
