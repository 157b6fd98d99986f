use crate::errors::MockError;
use crate::logging::{LogLevel, DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_RENDERED_BYTES: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Cap for each rendered call in error messages.
    pub max_rendered_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub level: LogLevel,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarnessConfig {
    pub verify_after_case: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_rendered_bytes: 512,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: LogLevel::Info,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            verify_after_case: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialEngineConfig {
    diagnostics: Option<PartialDiagnosticsConfig>,
    logging: Option<PartialLoggingConfig>,
    harness: Option<PartialHarnessConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialDiagnosticsConfig {
    max_rendered_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    level: Option<LogLevel>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialHarnessConfig {
    verify_after_case: Option<bool>,
}

impl EngineConfig {
    /// Parse a TOML document on top of the defaults. Relative log paths are
    /// kept as written.
    pub fn from_toml_str(contents: &str) -> Result<Self, MockError> {
        let partial: PartialEngineConfig =
            toml::from_str(contents).map_err(|e| MockError::ConfigParse(e.to_string()))?;
        let mut cfg = Self::default();
        merge_partial_config(&mut cfg, partial);
        validate_config(&cfg)?;
        Ok(cfg)
    }
}

/// Load config from `path`; relative log paths resolve against the file's directory.
pub fn load_config(path: &Path) -> Result<EngineConfig, MockError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| MockError::Io(format!("read {}: {e}", path.display())))?;
    let mut cfg = EngineConfig::from_toml_str(&contents)?;
    if let (Some(log_path), Some(base)) = (cfg.logging.path.as_ref(), path.parent()) {
        if log_path.is_relative() {
            cfg.logging.path = Some(base.join(log_path));
        }
    }
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut EngineConfig, partial: PartialEngineConfig) {
    if let Some(diagnostics) = partial.diagnostics {
        if let Some(value) = diagnostics.max_rendered_bytes {
            cfg.diagnostics.max_rendered_bytes = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(level) = logging.level {
            cfg.logging.level = level;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }

    if let Some(harness) = partial.harness {
        if let Some(value) = harness.verify_after_case {
            cfg.harness.verify_after_case = value;
        }
    }
}

fn validate_config(cfg: &EngineConfig) -> Result<(), MockError> {
    if cfg.diagnostics.max_rendered_bytes < MIN_RENDERED_BYTES {
        return Err(MockError::InvalidConfig(format!(
            "diagnostics.max_rendered_bytes must be at least {MIN_RENDERED_BYTES}"
        )));
    }
    if cfg.logging.max_payload_bytes == 0 {
        return Err(MockError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }
    if cfg.logging.budget_bytes == 0 {
        return Err(MockError::InvalidConfig(
            "logging.budget_bytes must be greater than zero".to_string(),
        ));
    }
    if let Some(path) = &cfg.logging.path {
        if path.as_os_str().is_empty() {
            return Err(MockError::InvalidConfig(
                "logging.path must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_toml_str("").expect("parse");
        assert_eq!(cfg, EngineConfig::default());
        assert!(cfg.harness.verify_after_case);
        assert!(cfg.logging.path.is_none());
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [diagnostics]
            max_rendered_bytes = 64

            [logging]
            level = "debug"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.diagnostics.max_rendered_bytes, 64);
        assert_eq!(cfg.logging.level, LogLevel::Debug);
        assert_eq!(cfg.logging.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
    }

    #[test]
    fn rejects_tiny_render_cap() {
        let err = EngineConfig::from_toml_str("[diagnostics]\nmax_rendered_bytes = 4\n")
            .expect_err("too small");
        assert!(matches!(err, MockError::InvalidConfig(message) if message.contains("max_rendered_bytes")));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = EngineConfig::from_toml_str("[harness]\nverify = false\n").expect_err("unknown");
        assert!(matches!(err, MockError::ConfigParse(_)));
    }

    #[test]
    fn load_resolves_relative_log_path_against_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("callscript.toml");
        std::fs::write(
            &path,
            "[logging]\npath = \"logs/mock.jsonl\"\n\n[harness]\nverify_after_case = false\n",
        )
        .expect("write config");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.logging.path, Some(dir.path().join("logs/mock.jsonl")));
        assert!(!cfg.harness.verify_after_case);
    }

    #[test]
    fn load_reports_missing_file_as_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(matches!(err, MockError::Io(_)));
    }
}
