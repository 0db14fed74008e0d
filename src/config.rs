//! Runtime settings for the transport request engine
//!
//! Settings are layered:
//! 1. Default values in code
//! 2. An optional TOML file
//! 3. Environment variable overrides with the `STOCK_TRANSPORT` prefix,
//!    sections separated by `__` (e.g. `STOCK_TRANSPORT__SEQUENCE__PREFIX`)

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub store: StoreSettings,
    pub sequence: SequenceSettings,
    pub workflow: WorkflowSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    /// Directory of the sled database
    pub path: PathBuf,

    /// Remove the database when the store is dropped
    pub temporary: bool,
}

/// Format of request references, `prefix` followed by a zero padded counter.
#[derive(Debug, Deserialize, Clone)]
pub struct SequenceSettings {
    pub prefix: String,
    pub padding: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowSettings {
    /// Use any internal picking type when the providing warehouse has none
    pub fallback_to_any_internal_type: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("store.path", "data/stock_transport.db")?
            .set_default("store.temporary", false)?
            .set_default("sequence.prefix", "STR/")?
            .set_default("sequence.padding", 5)?
            .set_default("workflow.fallback_to_any_internal_type", true)?
            .set_default("logging.filter", "info")?
            .set_default("logging.json", false)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("STOCK_TRANSPORT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/stock_transport.db"),
            temporary: false,
        }
    }
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            prefix: "STR/".to_string(),
            padding: 5,
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            fallback_to_any_internal_type: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_a_file() {
        let settings = Settings::load(None).unwrap();

        assert_eq!(settings.sequence.prefix, "STR/");
        assert_eq!(settings.sequence.padding, 5);
        assert!(settings.workflow.fallback_to_any_internal_type);
        assert!(!settings.logging.json);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transport.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[sequence]\nprefix = \"WH/STR/\"\npadding = 3").unwrap();
        writeln!(file, "[workflow]\nfallback_to_any_internal_type = false").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.sequence.prefix, "WH/STR/");
        assert_eq!(settings.sequence.padding, 3);
        assert!(!settings.workflow.fallback_to_any_internal_type);
        assert_eq!(settings.logging.filter, "info");
    }
}
