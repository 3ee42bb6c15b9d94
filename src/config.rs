//! Deployment values for one cluster
//!
//! Account, modules, executables and potential files differ between clusters, so they are read
//! from a TOML file instead of living in the templates. Every key has a default and a missing
//! file simply means "use the defaults".

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    pub cluster: ClusterSection,
    pub potential: PotentialSection,
    pub scheduler: SchedulerSection,
}

/// Values that end up in the job script
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSection {
    /// `#SBATCH --account`, omitted when unset
    pub account: Option<String>,
    /// Environment modules loaded with a single `module load` line
    pub modules: Vec<String>,
    /// Exported before the engine runs, in key order
    pub environment: BTreeMap<String, String>,
    pub launcher: String,
    /// LAMMPS executable built with the MLIP interface
    pub engine: String,
}

impl Default for ClusterSection {
    fn default() -> Self {
        ClusterSection {
            account: None,
            modules: Vec::new(),
            environment: BTreeMap::new(),
            launcher: "srun".to_string(),
            engine: "lmp_mpi".to_string(),
        }
    }
}

/// Values that end up in the LAMMPS inputs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PotentialSection {
    /// MLIP configuration passed to `pair_style mlip`
    pub file: String,
    /// Mass of each atom type, type 1 first
    pub masses: Vec<f64>,
    /// Shared library loaded with `plugin load` for transition searches
    pub artn_plugin: String,
}

impl Default for PotentialSection {
    fn default() -> Self {
        PotentialSection {
            file: "mlip.ini".to_string(),
            masses: vec![28.0855],
            artn_plugin: "libartn-lmp.so".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub program: String,
    /// How long the submit command itself may run, not the job
    pub timeout_seconds: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        SchedulerSection { program: "sbatch".to_string(), timeout_seconds: 30 }
    }
}

impl SchedulerSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ClusterConfig {
    /// Read a config file, or fall back to the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                info!("Reading cluster config {}", path.display());
                let text = fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                Self::from_toml_str(&text)?
            }
            None => {
                info!("No cluster config given, using defaults");
                ClusterConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.cluster.launcher.trim().is_empty() {
            return invalid("cluster.launcher is empty".to_string());
        }
        if self.cluster.engine.trim().is_empty() {
            return invalid("cluster.engine is empty".to_string());
        }
        if let Some(account) = &self.cluster.account {
            if account.is_empty() || account.chars().any(char::is_whitespace) {
                return invalid(format!("cluster.account {account:?} is not a valid account name"));
            }
        }
        for key in self.cluster.environment.keys() {
            if !is_env_key(key) {
                return invalid(format!("cluster.environment key {key:?} is not a shell variable name"));
            }
        }
        if self.potential.masses.is_empty() {
            return invalid("potential.masses needs at least one atom type".to_string());
        }
        if let Some(mass) = self.potential.masses.iter().find(|m| !m.is_finite() || **m <= 0.0) {
            return invalid(format!("potential.masses contains {mass}, masses must be positive"));
        }
        if self.scheduler.program.trim().is_empty() {
            return invalid("scheduler.program is empty".to_string());
        }
        // submitting is quick, anything past ten minutes means the client is stuck
        if self.scheduler.timeout_seconds == 0 || self.scheduler.timeout_seconds > 600 {
            return invalid(format!(
                "scheduler.timeout_seconds must be in (0, 600], got {}",
                self.scheduler.timeout_seconds
            ));
        }
        Ok(())
    }
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.timeout(), Duration::from_secs(30));
        assert_eq!(config.cluster.launcher, "srun");
    }

    #[test]
    fn test_example_config_parses() {
        static EXAMPLE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/config/cluster.toml"));
        let config = ClusterConfig::from_toml_str(EXAMPLE).unwrap();

        assert_eq!(config.cluster.account.as_deref(), Some("def-belandl1"));
        assert_eq!(config.cluster.modules.len(), 3);
        assert!(config.cluster.environment.contains_key("LD_LIBRARY_PATH"));
        assert_eq!(config.potential.masses, vec![28.0855]);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = ClusterConfig::from_toml_str("[scheduler]\ntimeout_seconds = 5\n").unwrap();
        assert_eq!(config.scheduler.program, "sbatch");
        assert_eq!(config.scheduler.timeout_seconds, 5);
        assert_eq!(config.potential, PotentialSection::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ClusterConfig::from_toml_str("[cluster]\nacount = \"typo\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "[scheduler]\ntimeout_seconds = 0\n",
            "[potential]\nmasses = []\n",
            "[potential]\nmasses = [-1.0]\n",
            "[cluster]\nengine = \"\"\n",
            "[cluster.environment]\n\"1BAD\" = \"x\"\n",
        ] {
            let err = ClusterConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{text}");
        }
    }

    #[test]
    fn test_missing_file() {
        let err = ClusterConfig::load(Some(Path::new("/nonexistent/cluster.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cluster.toml"));
    }
}
