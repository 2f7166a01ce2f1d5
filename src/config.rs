//! Compiler configuration types.
//!
//! Configuration is immutable after construction, so one `CompilerConfig`
//! can be shared by every worker of a session.
//!
//! # Example
//!
//! ```rust
//! use mtm_compiler::config::{CompilerConfig, Target};
//!
//! let config = CompilerConfig::builder()
//!     .targets(vec![Target::React, Target::Svelte])
//!     .workers(2)
//!     .stale_fallback(true)
//!     .build();
//!
//! assert!(config.stale_fallback);
//! assert_eq!(config.workers, 2);
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// A code generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    /// React function component.
    #[serde(rename = "reactjs")]
    React,
    /// Vue single-file component with `<script setup>`.
    #[serde(rename = "vue")]
    Vue,
    /// Svelte component.
    #[serde(rename = "svelte")]
    Svelte,
    /// Solid component.
    #[serde(rename = "solid")]
    Solid,
}

impl Target {
    /// Every supported backend.
    pub const ALL: [Target; 4] = [Target::React, Target::Vue, Target::Svelte, Target::Solid];

    /// The name used in frontmatter.
    pub fn as_str(self) -> &'static str {
        match self {
            Target::React => "reactjs",
            Target::Vue => "vue",
            Target::Svelte => "svelte",
            Target::Solid => "solid",
        }
    }

    /// File extension of the emitted source.
    pub fn extension(self) -> &'static str {
        match self {
            Target::React => "jsx",
            Target::Vue => "vue",
            Target::Svelte => "svelte",
            Target::Solid => "jsx",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTarget(pub String);

impl fmt::Display for UnknownTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown target `{}` (expected one of reactjs, vue, solid, svelte)",
            self.0
        )
    }
}

impl std::error::Error for UnknownTarget {}

impl std::str::FromStr for Target {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reactjs" => Ok(Target::React),
            "vue" => Ok(Target::Vue),
            "svelte" => Ok(Target::Svelte),
            "solid" => Ok(Target::Solid),
            other => Err(UnknownTarget(other.to_string())),
        }
    }
}

/// Immutable compiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Targets to emit for every file. Empty means the frontmatter `target`.
    pub targets: Vec<Target>,
    /// Target for files without frontmatter.
    pub default_target: Option<Target>,

    // Cache options
    /// Maximum number of cache entries before eviction.
    pub cache_max_size: usize,
    /// Age after which `sweep_expired` drops an entry.
    pub cache_ttl_secs: u64,
    /// Keep the last good compilation when a reparse fails.
    pub stale_fallback: bool,

    // Worker pool options
    /// Fixed number of worker threads.
    pub workers: usize,
    /// Per-job time budget in milliseconds.
    pub job_timeout_ms: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            default_target: None,
            cache_max_size: 500,
            cache_ttl_secs: 3600,
            stale_fallback: false,
            workers: num_cpus::get().max(1),
            job_timeout_ms: 30_000,
        }
    }
}

impl CompilerConfig {
    /// Create a new builder for `CompilerConfig`.
    pub fn builder() -> CompilerConfigBuilder {
        CompilerConfigBuilder::default()
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CompilerConfig =
            serde_json::from_str(json).context("Could not parse compiler configuration")?;
        Ok(config.normalized())
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// The per-job timeout.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// The cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.cache_max_size = self.cache_max_size.max(1);
        self
    }
}

/// Builder for `CompilerConfig`.
#[derive(Debug, Default)]
pub struct CompilerConfigBuilder {
    config: CompilerConfig,
}

impl CompilerConfigBuilder {
    /// Set the targets emitted for every file.
    pub fn targets(mut self, value: Vec<Target>) -> Self {
        self.config.targets = value;
        self
    }

    /// Set the target for files without frontmatter.
    pub fn default_target(mut self, value: Target) -> Self {
        self.config.default_target = Some(value);
        self
    }

    /// Set the cache size bound.
    pub fn cache_max_size(mut self, value: usize) -> Self {
        self.config.cache_max_size = value;
        self
    }

    /// Set the cache TTL in seconds.
    pub fn cache_ttl_secs(mut self, value: u64) -> Self {
        self.config.cache_ttl_secs = value;
        self
    }

    /// Keep the last good compilation when a reparse fails.
    pub fn stale_fallback(mut self, value: bool) -> Self {
        self.config.stale_fallback = value;
        self
    }

    /// Set the worker count.
    pub fn workers(mut self, value: usize) -> Self {
        self.config.workers = value;
        self
    }

    /// Set the per-job timeout in milliseconds.
    pub fn job_timeout_ms(mut self, value: u64) -> Self {
        self.config.job_timeout_ms = value;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> CompilerConfig {
        self.config.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert!(config.targets.is_empty());
        assert_eq!(config.cache_max_size, 500);
        assert_eq!(config.job_timeout(), Duration::from_secs(30));
        assert!(config.workers >= 1);
        assert!(!config.stale_fallback);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::builder()
            .default_target(Target::Vue)
            .cache_max_size(0)
            .workers(0)
            .job_timeout_ms(50)
            .build();

        assert_eq!(config.default_target, Some(Target::Vue));
        assert_eq!(config.cache_max_size, 1);
        assert_eq!(config.workers, 1);
        assert_eq!(config.job_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("reactjs".parse::<Target>().unwrap(), Target::React);
        assert_eq!("solid".parse::<Target>().unwrap(), Target::Solid);
        assert!("react".parse::<Target>().is_err());
        assert_eq!(Target::Svelte.to_string(), "svelte");
    }

    #[test]
    fn test_from_json_str() {
        let config =
            CompilerConfig::from_json_str(r#"{"targets": ["reactjs", "vue"], "workers": 3}"#)
                .unwrap();
        assert_eq!(config.targets, vec![Target::React, Target::Vue]);
        assert_eq!(config.workers, 3);
        assert_eq!(config.cache_ttl_secs, 3600);

        assert!(CompilerConfig::from_json_str(r#"{"targets": ["angular"]}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mtm.json");
        std::fs::write(&path, r#"{"stale_fallback": true}"#).unwrap();

        let config = CompilerConfig::from_file(&path).unwrap();
        assert!(config.stale_fallback);

        let missing = CompilerConfig::from_file(&dir.path().join("nope.json"));
        assert!(format!("{:#}", missing.unwrap_err()).contains("nope.json"));
    }

    #[test]
    fn test_config_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompilerConfig>();
    }
}
