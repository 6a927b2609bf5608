//! Configuration system
//!
//! `SyncConfig` holds the knobs of the synchronisation layer. Any type
//! implementing [`Config`] can be loaded from or saved to `.toml` and
//! `.ron` files.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;
        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, picking the format from `path`'s extension
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # Synchronisation Configuration
///
/// Controls how entity paths are derived and which optional behaviours of
/// the synchronisation context are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Prefix prepended to every derived entity path (empty or absolute)
    pub path_prefix: String,
    /// Scope under which non-DAG material entities are placed
    pub material_scope: String,
    /// Collapse repeated occurrences of a shape into one instancer
    pub enable_instancing: bool,
    /// Default `env_logger` filter for binaries embedding the crate
    pub log_filter: String,
    /// Change-tracker collection bumped when the selection result changes
    pub selection_collection: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            material_scope: "_materials".to_string(),
            enable_instancing: true,
            log_filter: "info".to_string(),
            selection_collection: "selection".to_string(),
        }
    }
}

impl Config for SyncConfig {}

impl SyncConfig {
    /// Set the entity path prefix
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Enable or disable instancing
    pub fn with_instancing(mut self, enabled: bool) -> Self {
        self.enable_instancing = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path_prefix.is_empty() {
            if !self.path_prefix.starts_with('/') || self.path_prefix.ends_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "path prefix must be empty or an absolute path without trailing '/': {:?}",
                    self.path_prefix
                )));
            }
            if self.path_prefix[1..].split('/').any(|c| !is_identifier(c)) {
                return Err(ConfigError::Invalid(format!(
                    "path prefix has a non-identifier component: {:?}",
                    self.path_prefix
                )));
            }
        }

        if !is_identifier(&self.material_scope) {
            return Err(ConfigError::Invalid(format!(
                "material scope must be an identifier: {:?}",
                self.material_scope
            )));
        }

        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enable_instancing);
        assert_eq!(config.material_scope, "_materials");
    }

    #[test]
    fn test_prefix_validation() {
        assert!(SyncConfig::default().with_path_prefix("/sync").validate().is_ok());
        assert!(SyncConfig::default().with_path_prefix("sync").validate().is_err());
        assert!(SyncConfig::default().with_path_prefix("/sync/").validate().is_err());
        assert!(SyncConfig::default().with_path_prefix("/9lives").validate().is_err());
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let text = "path_prefix = \"/viewport\"\nenable_instancing = false\n";
        let config = SyncConfig::from_str_with_format(text, "sync.toml").unwrap();

        assert_eq!(config.path_prefix, "/viewport");
        assert!(!config.enable_instancing);
        // Unspecified fields fall back to defaults
        assert_eq!(config.selection_collection, "selection");
    }

    #[test]
    fn test_parse_ron() {
        let text = "(material_scope: \"looks\", log_filter: \"debug\")";
        let config = SyncConfig::from_str_with_format(text, "sync.ron").unwrap();

        assert_eq!(config.material_scope, "looks");
        assert_eq!(config.log_filter, "debug");
        assert!(config.enable_instancing);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = SyncConfig::from_str_with_format("", "sync.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let path = std::env::temp_dir().join(format!("scene_sync_cfg_{}.toml", std::process::id()));
        let path = path.to_string_lossy().to_string();

        let config = SyncConfig::default().with_path_prefix("/vp").with_instancing(false);
        config.save_to_file(&path).unwrap();
        let loaded = SyncConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
