//! Compiler and CLI configuration

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ExqlError, ExqlResult};
use crate::transpiler::Dialect;

/// Options that change the generated SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Table alias prefix; aliases are `{prefix}0`, `{prefix}1`, ...
    pub alias_prefix: String,

    /// Left-nest chained joins in parentheses. `false` emits them flat.
    pub nest_joins: bool,

    /// Target SQL dialect.
    pub dialect: Dialect,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            alias_prefix: "t".to_string(),
            nest_joins: true,
            dialect: Dialect::default(),
        }
    }
}

impl CompilerOptions {
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }
}

/// Main exql configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExqlConfig {
    /// Database connection URL
    pub database_url: Option<String>,

    /// Path to the model schema file
    pub schema_path: Option<String>,

    pub compiler: CompilerOptions,
}

impl ExqlConfig {
    /// Create a new configuration builder
    pub fn builder() -> ExqlConfigBuilder {
        ExqlConfigBuilder::default()
    }

    /// `~/.config/exql/config.toml` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("exql").join("config.toml"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> ExqlResult<Self> {
        toml::from_str(content).map_err(|e| ExqlError::Config(e.to_string()))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> ExqlResult<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Builder for ExqlConfig
#[derive(Debug, Default)]
pub struct ExqlConfigBuilder {
    config: ExqlConfig,
}

impl ExqlConfigBuilder {
    /// Set the database URL
    pub fn database(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Set the schema path
    pub fn schema(mut self, path: impl Into<String>) -> Self {
        self.config.schema_path = Some(path.into());
        self
    }

    pub fn alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.compiler.alias_prefix = prefix.into();
        self
    }

    pub fn nest_joins(mut self, nest: bool) -> Self {
        self.config.compiler.nest_joins = nest;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.compiler.dialect = dialect;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ExqlConfig {
        self.config
    }
}
