use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const DEBUG_ENV: &str = "VLRSCOUT_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            program: default_analyzer_program(),
            args: Vec::new(),
        }
    }
}

fn default_analyzer_program() -> String {
    "vlrscout-analyzer".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_true")]
    pub cors: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_threshold")]
    pub default_detection_threshold: f64,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            cors: true,
            log_level: default_log_level(),
            default_detection_threshold: default_threshold(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_database_file() -> String {
    "vlrscout.sqlite3".into()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

fn default_threshold() -> f64 {
    0.7
}

impl Config {
    /// Read the JSON config at `path`, or fall back to defaults when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };

        if debug_forced() {
            config.log_level = "debug".into();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.default_detection_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            bail!("defaultDetectionThreshold {threshold} must be within [0, 1]");
        }
        if self.analyzer.program.trim().is_empty() {
            bail!("analyzer.program must not be empty");
        }
        Ok(())
    }

    /// Per-session artifact folders live here and are served under `/artifacts`.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

fn debug_forced() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
