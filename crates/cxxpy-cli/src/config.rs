//! Configuration for cxxpy.
//!
//! Loaded from `--config FILE`, or `cxxpy.toml` in the working directory
//! when present. Command line flags override every value.
//!
//! Example cxxpy.toml:
//! ```toml
//! root_module = "app"
//!
//! [defines]
//! NDEBUG = 1
//! PLATFORM = "linux"
//! ```

use anyhow::Context;
use cxxpy::Defines;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "cxxpy.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CxxpyConfig {
    /// Name of the module the inputs are parsed into.
    pub root_module: Option<String>,
    /// Macros defined before the first file is preprocessed.
    pub defines: BTreeMap<String, toml::Value>,
}

impl CxxpyConfig {
    /// Load `path`, or the default file if no path was given and it exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None if Path::new(DEFAULT_CONFIG).is_file() => Self::load_file(Path::new(DEFAULT_CONFIG)),
            None => Ok(Self::default()),
        }
    }

    fn load_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Config defines as replacement text, then `-D` flags on top.
    pub fn defines(&self, flags: &[String]) -> Defines {
        let mut defines: Defines = self
            .defines
            .iter()
            .map(|(name, value)| (name.clone(), define_text(value)))
            .collect();
        for flag in flags {
            let (name, value) = parse_define(flag);
            defines.insert(name, value);
        }
        defines
    }
}

fn define_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(b) => String::from(if *b { "1" } else { "0" }),
        other => other.to_string(),
    }
}

/// `NAME=VALUE`, or `NAME` meaning `NAME=1`.
pub fn parse_define(flag: &str) -> (String, String) {
    match flag.split_once('=') {
        Some((name, value)) => (name.trim().to_string(), value.to_string()),
        None => (flag.trim().to_string(), "1".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let config: CxxpyConfig = toml::from_str(
            "root_module = \"app\"\n[defines]\nLEVEL = 2\nDEBUG = true\nNAME = \"x\"\n",
        )
        .unwrap();
        assert_eq!(config.root_module.as_deref(), Some("app"));
        let defines = config.defines(&["LEVEL=5".to_string(), "FAST".to_string()]);
        assert_eq!(defines["LEVEL"], "5");
        assert_eq!(defines["DEBUG"], "1");
        assert_eq!(defines["NAME"], "x");
        assert_eq!(defines["FAST"], "1");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<CxxpyConfig>("root = 1").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CxxpyConfig::load(Some(dir.path().join("nope.toml").as_path())).is_err());
    }
}
