// Sandbox configuration shared by the API and CLI
use std::time::Duration;

pub const PRODUCT_NAME: &str = "codepulse";

/// Label attached to every image and container the sandbox creates
pub const SANDBOX_LABEL: &str = "codepulse.sandbox";

/// In-container path the build context is mounted at
pub const CONTAINER_WORKDIR: &str = "/app";

pub const DEFAULT_MEMORY_LIMIT_BYTES: i64 = 512 * 1024 * 1024;
pub const DEFAULT_CPU_LIMIT: f64 = 0.5;
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(30);

/// Requests with larger sources are rejected before reaching the runtime
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024;

/// How image tags are derived for an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagPolicy {
    /// `codepulse-<language>-image-<token>`: every execution owns its image
    #[default]
    PerExecution,
    /// `codepulse-<language>-image`: concurrent executions of one language
    /// build over and remove the same tag
    SharedPerLanguage,
}

impl TagPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "per-execution" | "per_execution" | "unique" => Some(TagPolicy::PerExecution),
            "shared" | "per-language" | "per_language" => Some(TagPolicy::SharedPerLanguage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub memory_limit_bytes: i64,
    /// Fraction of one core
    pub cpu_limit: f64,
    pub execution_timeout: Duration,
    pub tag_policy: TagPolicy,
    /// Created-but-never-started containers younger than this are left to their owner
    pub stale_grace: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            cpu_limit: DEFAULT_CPU_LIMIT,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            tag_policy: TagPolicy::default(),
            stale_grace: DEFAULT_STALE_GRACE,
        }
    }
}

impl SandboxConfig {
    /// Defaults overridden by `PULSE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(bytes) = lookup("PULSE_MEMORY_LIMIT_MB")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|mb| mb.checked_mul(1024 * 1024))
        {
            config.memory_limit_bytes = bytes;
        }
        if let Some(cpu) = lookup("PULSE_CPU_LIMIT").and_then(|v| v.parse::<f64>().ok()) {
            if cpu > 0.0 {
                config.cpu_limit = cpu;
            }
        }
        if let Some(secs) = lookup("PULSE_EXECUTION_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.execution_timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = lookup("PULSE_TAG_POLICY").and_then(|v| TagPolicy::parse(&v)) {
            config.tag_policy = policy;
        }
        if let Some(secs) = lookup("PULSE_STALE_GRACE_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.stale_grace = Duration::from_secs(secs);
        }

        config
    }

    /// CPU limit in the runtime's nano-CPU unit
    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_limit * 1_000_000_000.0) as i64
    }
}
