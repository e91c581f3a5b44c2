// Build Context Materializer: one exclusively-owned temp dir per execution
use crate::error::SandboxError;
use crate::language::{LanguageProfile, RECIPE_FILE};
use pulse_common::types::Language;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Temporary directory holding the harness source and the build recipe.
///
/// The directory is removed by [`BuildContext::release`] or, if that is never
/// reached (early return, panic, dropped future), when the value is dropped.
#[derive(Debug)]
pub struct BuildContext {
    dir: Option<TempDir>,
    path: PathBuf,
    entry_file: &'static str,
    recipe: &'static str,
}

impl BuildContext {
    pub fn materialize(language: Language, source: &str) -> Result<Self, SandboxError> {
        let profile = LanguageProfile::of(language);

        let dir = tempfile::Builder::new()
            .prefix("codepulse-")
            .tempdir()
            .map_err(|e| SandboxError::Build(format!("failed to create build context: {}", e)))?;
        let path = dir.path().to_path_buf();

        // From here on a failed write drops `dir`, which removes it
        fs::write(path.join(profile.entry_file), source)
            .map_err(|e| SandboxError::Build(format!("failed to write {}: {}", profile.entry_file, e)))?;
        fs::write(path.join(RECIPE_FILE), profile.recipe)
            .map_err(|e| SandboxError::Build(format!("failed to write {}: {}", RECIPE_FILE, e)))?;

        debug!(path = %path.display(), entry_file = profile.entry_file, "Build context materialized");

        Ok(Self {
            dir: Some(dir),
            path,
            entry_file: profile.entry_file,
            recipe: profile.recipe,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_file(&self) -> &'static str {
        self.entry_file
    }

    pub fn recipe(&self) -> &'static str {
        self.recipe
    }

    pub fn recipe_path(&self) -> PathBuf {
        self.path.join(RECIPE_FILE)
    }

    /// Remove the directory. Failures are logged and otherwise ignored.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!(path = %self.path.display(), "Build context removed"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove build context"),
            }
        }
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        self.remove();
    }
}
