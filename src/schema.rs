//! Model schema files
//!
//! Declares row types without Rust structs, for the textual front end and CLI.
//!
//! ```toml
//! [[model]]
//! name = "Customer"
//! table = "Customers"
//! primary_key = "Id"
//! fields = [
//!     { name = "Id", type = "int" },
//!     { name = "Name", type = "text", column = "full_name" },
//! ]
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ExqlError, ExqlResult};
use crate::mapping::{ModelMeta, ModelRef};
use crate::value::ValueType;

/// Field definition in a schema file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Physical column, defaults to the field name
    #[serde(default)]
    pub column: Option<String>,
}

/// Model definition in a schema file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    /// Table name, defaults to the model name
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "model")]
    models: Vec<ModelDef>,
}

/// Loaded set of dynamic models.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: Vec<ModelRef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse schema TOML.
    pub fn from_toml(content: &str) -> ExqlResult<Self> {
        let file: SchemaFile =
            toml::from_str(content).map_err(|e| ExqlError::Config(format!("Failed to parse schema: {}", e)))?;

        let mut schema = Self::new();
        for def in file.models {
            schema.add_model(def)?;
        }
        Ok(schema)
    }

    /// Load schema from a TOML file
    pub fn load(path: &Path) -> ExqlResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let schema = Self::from_toml(&content)?;
        tracing::info!("Loaded {} models from {}", schema.models.len(), path.display());
        Ok(schema)
    }

    pub fn add_model(&mut self, def: ModelDef) -> ExqlResult<()> {
        if self.find(&def.name).is_some() {
            return Err(ExqlError::Config(format!("model '{}' declared twice", def.name)));
        }
        if let Some(pk) = &def.primary_key {
            if !def.fields.iter().any(|f| &f.name == pk) {
                return Err(ExqlError::Config(format!(
                    "primary key '{}' is not a field of '{}'",
                    pk, def.name
                )));
            }
        }

        tracing::debug!("Loaded schema for model: {}", def.name);
        let table = def.table.unwrap_or_else(|| def.name.clone());
        let fields = def.fields.into_iter().map(|f| {
            let column = f.column.unwrap_or_else(|| f.name.clone());
            (f.name, column, Some(f.value_type))
        });
        self.models
            .push(Arc::new(ModelMeta::dynamic(def.name, table, fields, def.primary_key)));
        Ok(())
    }

    pub fn models(&self) -> &[ModelRef] {
        &self.models
    }

    /// Model by type name, falling back to table name.
    pub fn find(&self, name: &str) -> Option<&ModelRef> {
        self.models
            .iter()
            .find(|m| m.type_name() == name)
            .or_else(|| self.models.iter().find(|m| m.table() == name))
    }

    pub fn get(&self, name: &str) -> ExqlResult<&ModelRef> {
        self.find(name).ok_or_else(|| ExqlError::member(name, "schema"))
    }
}
