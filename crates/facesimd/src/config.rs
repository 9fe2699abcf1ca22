use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Service configuration.
///
/// Resolved in three layers: built-in defaults, then the optional TOML file
/// named by `FACESIM_CONFIG`, then `FACESIM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Cosine similarity at or above which two faces are the same person.
    pub similarity_threshold: f32,
    /// Root under which per-request scratch directories are created.
    pub scratch_dir: PathBuf,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Pending comparisons the engine queue holds before callers wait.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            model_dir: facesim_core::default_model_dir(),
            similarity_threshold: facesim_core::DEFAULT_SIMILARITY_THRESHOLD,
            scratch_dir: std::env::temp_dir(),
            max_upload_bytes: 16 * 1024 * 1024,
            queue_depth: 4,
        }
    }
}

impl Config {
    /// Load configuration from `FACESIM_CONFIG` (if set) and the environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os("FACESIM_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Override fields from `FACESIM_*` variables supplied by `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("FACESIM_BIND_ADDR") {
            self.bind_addr = v.parse().with_context(|| format!("FACESIM_BIND_ADDR={v}"))?;
        }
        if let Some(v) = lookup("FACESIM_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACESIM_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v
                .parse()
                .with_context(|| format!("FACESIM_SIMILARITY_THRESHOLD={v}"))?;
        }
        if let Some(v) = lookup("FACESIM_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACESIM_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = v.parse().with_context(|| format!("FACESIM_MAX_UPLOAD_BYTES={v}"))?;
        }
        if let Some(v) = lookup("FACESIM_QUEUE_DEPTH") {
            self.queue_depth = v.parse().with_context(|| format!("FACESIM_QUEUE_DEPTH={v}"))?;
        }

        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.similarity_threshold),
            "similarity threshold {} is outside [-1, 1]",
            self.similarity_threshold
        );
        anyhow::ensure!(self.queue_depth > 0, "queue depth must be at least 1");
        Ok(())
    }
}
