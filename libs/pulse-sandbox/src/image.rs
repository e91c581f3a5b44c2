/// Image Builder
///
/// Packs a build context into a tar stream and has the runtime build and tag
/// an image from it. Only the outcome is kept; progress goes to trace logs.
///
/// Any failure here is a build error and ends the execution before a
/// container exists.

use crate::context::BuildContext;
use crate::error::SandboxError;
use crate::language::RECIPE_FILE;
use crate::runtime::{BuildRequest, ContainerRuntime};
use pulse_common::config::{TagPolicy, PRODUCT_NAME, SANDBOX_LABEL};
use pulse_common::types::Language;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Image tag for an execution under `policy`
pub fn image_tag(policy: TagPolicy, language: Language, token: &str) -> String {
    match policy {
        TagPolicy::PerExecution => format!("{}-{}-image-{}", PRODUCT_NAME, language, token),
        TagPolicy::SharedPerLanguage => format!("{}-{}-image", PRODUCT_NAME, language),
    }
}

/// Labels applied to everything the sandbox creates, so sweeps only touch our objects
pub fn sandbox_labels(language: Language) -> HashMap<String, String> {
    HashMap::from([
        (SANDBOX_LABEL.to_string(), "true".to_string()),
        (format!("{}.language", SANDBOX_LABEL), language.to_string()),
    ])
}

pub struct ImageBuilder {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    #[instrument(skip(self, context), fields(path = %context.path().display()))]
    pub async fn build(&self, context: &BuildContext, language: Language, tag: &str) -> Result<(), SandboxError> {
        let start = Instant::now();

        // The recipe must be on disk: it is what the daemon will read from the archive
        let recipe = fs::read_to_string(context.recipe_path())
            .map_err(|e| SandboxError::Build(format!("failed to read {}: {}", RECIPE_FILE, e)))?;
        if recipe.trim().is_empty() {
            return Err(SandboxError::Build(format!("{} is empty", RECIPE_FILE)));
        }

        let context_tar = pack(context)
            .map_err(|e| SandboxError::Build(format!("failed to write build stream: {}", e)))?;

        let request = BuildRequest {
            tag: tag.to_string(),
            dockerfile: RECIPE_FILE.to_string(),
            context_tar,
            labels: sandbox_labels(language),
        };

        match self.runtime.build_image(request).await {
            Ok(()) => {
                info!(tag, build_ms = start.elapsed().as_millis() as u64, "Image built");
                Ok(())
            }
            Err(e) => {
                warn!(tag, error = %e, "Image build failed");
                Err(SandboxError::Build(e.to_string()))
            }
        }
    }
}

/// In-memory tar of the (flat) context directory, entries named relative to its root
fn pack(context: &BuildContext) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.mode(tar::HeaderMode::Deterministic);

    let mut entries: Vec<_> = fs::read_dir(context.path())?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if entry.file_type()?.is_file() {
            builder.append_path_with_name(entry.path(), entry.file_name())?;
        }
    }

    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockRuntime};
    use std::io::Read;

    #[test]
    fn test_per_execution_tags_are_unique() {
        let a = image_tag(TagPolicy::PerExecution, Language::Python, "aaa");
        let b = image_tag(TagPolicy::PerExecution, Language::Python, "bbb");
        assert_eq!(a, "codepulse-python-image-aaa");
        assert_ne!(a, b);
    }

    #[test]
    fn test_shared_tag_ignores_token() {
        assert_eq!(
            image_tag(TagPolicy::SharedPerLanguage, Language::JavaScript, "aaa"),
            "codepulse-javascript-image"
        );
    }

    #[test]
    fn test_pack_contains_source_and_recipe() {
        let context = BuildContext::materialize(Language::Python, "print(1)").unwrap();
        let bytes = pack(&context).unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut files = HashMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .unwrap()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            files.insert(name, body);
        }

        assert_eq!(files.get("main.py").map(String::as_str), Some("print(1)"));
        assert!(files.get("Dockerfile").unwrap().contains("FROM python"));
    }

    #[tokio::test]
    async fn test_build_sends_labeled_request() {
        let mock = Arc::new(MockRuntime::new());
        let context = BuildContext::materialize(Language::Go, "package main").unwrap();

        ImageBuilder::new(mock.clone())
            .build(&context, Language::Go, "codepulse-go-image-x")
            .await
            .unwrap();

        let request = mock.last_build().unwrap();
        assert_eq!(request.tag, "codepulse-go-image-x");
        assert_eq!(request.dockerfile, "Dockerfile");
        assert!(!request.context_tar.is_empty());
        assert_eq!(request.labels.get(SANDBOX_LABEL).map(String::as_str), Some("true"));
        assert_eq!(mock.count(|c| matches!(c, Call::BuildImage(_))), 1);
    }

    #[tokio::test]
    async fn test_daemon_failure_is_build_error() {
        let mock = Arc::new(MockRuntime::new());
        mock.fail_build("pull access denied for python");
        let context = BuildContext::materialize(Language::Python, "x").unwrap();

        let err = ImageBuilder::new(mock.clone())
            .build(&context, Language::Python, "t")
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Build(ref m) if m.contains("pull access denied")));
    }

    #[tokio::test]
    async fn test_missing_recipe_is_build_error() {
        let mock = Arc::new(MockRuntime::new());
        let context = BuildContext::materialize(Language::Python, "x").unwrap();
        fs::remove_file(context.recipe_path()).unwrap();

        let err = ImageBuilder::new(mock.clone())
            .build(&context, Language::Python, "t")
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Build(_)));
        assert_eq!(mock.count(|c| matches!(c, Call::BuildImage(_))), 0);
    }
}
