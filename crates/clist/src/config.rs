//! `clist.toml` configuration.

use std::path::Path;

use serde::Deserialize;

use crate::{ClistError, ElementKind};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClistConfig {
    #[serde(default)]
    pub factory: FactoryConfig,
    #[serde(default)]
    pub jit: JitConfig,
    #[serde(default)]
    pub kinds: KindsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactoryConfig {
    /// Reuse the loaded type for a kind instead of generating a new one per request.
    #[serde(default = "default_true")]
    pub cache_units: bool,
    #[serde(default = "default_true")]
    pub fallback_on_definition_error: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            cache_units: true,
            fallback_on_definition_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub(crate) fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JitConfig {
    #[serde(default)]
    pub opt_level: OptLevel,
    /// Run the Cranelift verifier on every unit before it is compiled.
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            verify: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KindsConfig {
    /// Kinds that are always served by the fallback list.
    #[serde(default)]
    pub disabled: Vec<ElementKind>,
}

fn default_true() -> bool {
    true
}

pub fn parse_clist_toml(text: &str) -> Result<ClistConfig, ClistError> {
    toml::from_str(text).map_err(|err| ClistError::Config(err.to_string()))
}

pub fn read_clist_toml(path: &Path) -> Result<ClistConfig, ClistError> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text)
        .map_err(|err| ClistError::Config(format!("failed to parse {}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_clist_toml("").unwrap();
        assert!(config.factory.cache_units);
        assert!(config.factory.fallback_on_definition_error);
        assert_eq!(config.jit.opt_level, OptLevel::Speed);
        assert!(config.jit.verify);
        assert!(config.kinds.disabled.is_empty());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_clist_toml(
            r#"
[factory]
cache_units = false

[jit]
opt_level = "none"

[kinds]
disabled = ["char", "double"]
"#,
        )
        .unwrap();
        assert!(!config.factory.cache_units);
        assert!(config.factory.fallback_on_definition_error);
        assert_eq!(config.jit.opt_level, OptLevel::None);
        assert_eq!(
            config.kinds.disabled,
            vec![ElementKind::Char, ElementKind::Double]
        );
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let err = parse_clist_toml("[kinds]\ndisabled = [\"decimal\"]\n").unwrap_err();
        assert!(matches!(err, ClistError::Config(_)));
    }
}
