//! Model mapping registry.
//!
//! Every row type describes how its fields map to physical columns through
//! [`Model::describe`]. Descriptions are computed once per type and cached in a
//! process-wide registry keyed by [`TypeId`].
//!
//! ```rust,ignore
//! impl Model for Person {
//!     fn describe(model: &mut ModelBuilder<Self>) {
//!         model
//!             .table("People")
//!             .field("Id", |p: &Person| p.id, |p, v| p.id = v)
//!             .field("Name", |p: &Person| p.name.clone(), |p, v| p.name = v)
//!             .primary_key("Id")
//!             .default_constructor();
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{ExqlError, ExqlResult};
use crate::source::Cursor;
use crate::value::{FromValue, Value, ValueType, parse_datetime};

/// Shared handle to a model description.
pub type ModelRef = Arc<ModelMeta>;

/// Type-erased object produced by materialization.
pub type AnyObject = Box<dyn Any + Send>;

type Getter = Box<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Any, Value) -> ExqlResult<()> + Send + Sync>;
type DefaultFactory = Box<dyn Fn() -> AnyObject + Send + Sync>;
type PositionalFactory = Box<dyn Fn(Vec<Value>) -> ExqlResult<AnyObject> + Send + Sync>;

/// A row type that can be queried and materialized.
pub trait Model: Any + Send + Sized {
    fn describe(model: &mut ModelBuilder<Self>);
}

/// One mapped field.
pub struct FieldMeta {
    name: String,
    column: String,
    value_type: Option<ValueType>,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl FieldMeta {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn is_settable(&self) -> bool {
        self.setter.is_some()
    }
}

impl std::fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMeta")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("value_type", &self.value_type)
            .finish()
    }
}

pub(crate) enum Factory {
    None,
    Default(DefaultFactory),
    Positional {
        params: Vec<String>,
        build: PositionalFactory,
    },
}

/// Mapping metadata for one row type.
pub struct ModelMeta {
    type_name: String,
    table: String,
    fields: Vec<FieldMeta>,
    primary_key: Option<String>,
    factory: Factory,
}

impl std::fmt::Debug for ModelMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelMeta")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// Models compare by identity: one description per type.
impl PartialEq for ModelMeta {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl ModelMeta {
    fn empty(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            table: type_name.clone(),
            type_name,
            fields: Vec::new(),
            primary_key: None,
            factory: Factory::None,
        }
    }

    /// Describe a Rust type through its [`Model`] impl.
    pub fn describe<T: Model>() -> Self {
        let mut builder = ModelBuilder::<T>::new();
        T::describe(&mut builder);
        builder.meta
    }

    /// A model with no Rust type behind it, materialized as [`Record`].
    pub fn dynamic(
        type_name: impl Into<String>,
        table: impl Into<String>,
        fields: impl IntoIterator<Item = (String, String, Option<ValueType>)>,
        primary_key: Option<String>,
    ) -> Self {
        let mut meta = Self::empty(type_name);
        meta.table = table.into();
        meta.primary_key = primary_key;
        for (name, column, value_type) in fields {
            meta.fields.push(record_field(name, column, value_type));
        }
        let record_type = meta.type_name.clone();
        meta.factory = Factory::Default(Box::new(move || -> AnyObject {
            Box::new(Record::new(record_type.clone()))
        }));
        meta
    }

    /// Projection target with no table, materialized as [`Record`].
    pub fn anonymous<S: Into<String>>(members: impl IntoIterator<Item = (S, Option<ValueType>)>) -> Self {
        let fields = members.into_iter().map(|(name, value_type)| {
            let name = name.into();
            (name.clone(), name, value_type)
        });
        Self::dynamic("<anonymous>", "", fields, None)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Physical column for a field.
    pub fn column_of(&self, field: &str) -> ExqlResult<&str> {
        self.field(field)
            .map(|f| f.column.as_str())
            .ok_or_else(|| ExqlError::member(field, &self.type_name))
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Parameter names of the positional constructor, if the type has one.
    pub fn constructor_params(&self) -> Option<&[String]> {
        match &self.factory {
            Factory::Positional { params, .. } => Some(params),
            _ => None,
        }
    }

    pub(crate) fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Read a field back from a materialized object.
    pub fn get(&self, object: &dyn Any, field: &str) -> ExqlResult<Value> {
        let meta = self
            .field(field)
            .ok_or_else(|| ExqlError::member(field, &self.type_name))?;
        let getter = meta
            .getter
            .as_ref()
            .ok_or_else(|| ExqlError::unsupported(format!("field '{}' has no getter", field)))?;
        getter(object).ok_or_else(|| ExqlError::shape(format!("object is not a {}", self.type_name)))
    }

    /// Assign one field on a materialized object.
    pub fn set(&self, object: &mut dyn Any, field: &str, value: Value) -> ExqlResult<()> {
        let meta = self
            .field(field)
            .ok_or_else(|| ExqlError::member(field, &self.type_name))?;
        let setter = meta
            .setter
            .as_ref()
            .ok_or_else(|| ExqlError::member(field, &self.type_name))?;
        let value = match meta.value_type {
            Some(vt) => value.coerce(vt)?,
            None => value,
        };
        setter(object, value)
    }
}

fn record_field(name: String, column: String, value_type: Option<ValueType>) -> FieldMeta {
    let get_name = name.clone();
    let set_name = name.clone();
    FieldMeta {
        name,
        column,
        value_type,
        getter: Some(Box::new(move |object: &dyn Any| -> Option<Value> {
            object
                .downcast_ref::<Record>()
                .map(|r| r.get(&get_name).cloned().unwrap_or(Value::Null))
        })),
        setter: Some(Box::new(move |object: &mut dyn Any, value: Value| -> ExqlResult<()> {
            let record = object
                .downcast_mut::<Record>()
                .ok_or_else(|| ExqlError::shape("object is not a Record"))?;
            record.set(set_name.clone(), value);
            Ok(())
        })),
    }
}

/// Registration API handed to [`Model::describe`].
pub struct ModelBuilder<T> {
    meta: ModelMeta,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Model> ModelBuilder<T> {
    fn new() -> Self {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self {
            meta: ModelMeta::empty(short),
            _marker: PhantomData,
        }
    }

    /// Override the table name (default: the type name).
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.meta.table = name.into();
        self
    }

    /// Register a readable and settable field mapped to a same-named column.
    pub fn field<V>(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> &mut Self
    where
        V: FromValue + Into<Value> + 'static,
    {
        let field_name = name.to_string();
        self.meta.fields.push(FieldMeta {
            name: name.to_string(),
            column: name.to_string(),
            value_type: Some(V::TYPE),
            getter: Some(Box::new(move |object: &dyn Any| -> Option<Value> {
                object.downcast_ref::<T>().map(|t| get(t).into())
            })),
            setter: Some(Box::new(move |object: &mut dyn Any, value: Value| -> ExqlResult<()> {
                let target = object
                    .downcast_mut::<T>()
                    .ok_or_else(|| ExqlError::shape(format!("object for '{}' has the wrong type", field_name)))?;
                set(target, V::from_value(value)?);
                Ok(())
            })),
        });
        self
    }

    /// Register a field that is only populated through the positional constructor.
    pub fn readonly_field<V>(&mut self, name: &str, get: impl Fn(&T) -> V + Send + Sync + 'static) -> &mut Self
    where
        V: FromValue + Into<Value> + 'static,
    {
        self.meta.fields.push(FieldMeta {
            name: name.to_string(),
            column: name.to_string(),
            value_type: Some(V::TYPE),
            getter: Some(Box::new(move |object: &dyn Any| -> Option<Value> {
                object.downcast_ref::<T>().map(|t| get(t).into())
            })),
            setter: None,
        });
        self
    }

    /// Map a previously registered field to a differently named column.
    pub fn column(&mut self, field: &str, column: impl Into<String>) -> &mut Self {
        if let Some(meta) = self.meta.fields.iter_mut().find(|f| f.name == field) {
            meta.column = column.into();
        }
        self
    }

    pub fn primary_key(&mut self, field: &str) -> &mut Self {
        self.meta.primary_key = Some(field.to_string());
        self
    }

    /// Materialize through `T::default()` followed by per-field assignment.
    pub fn default_constructor(&mut self) -> &mut Self
    where
        T: Default,
    {
        self.meta.factory = Factory::Default(Box::new(|| -> AnyObject { Box::new(T::default()) }));
        self
    }

    /// Materialize through a single constructor taking `params` in order.
    pub fn constructor(
        &mut self,
        params: &[&str],
        build: impl Fn(&mut CtorArgs) -> ExqlResult<T> + Send + Sync + 'static,
    ) -> &mut Self {
        self.meta.factory = Factory::Positional {
            params: params.iter().map(|p| p.to_string()).collect(),
            build: Box::new(move |values: Vec<Value>| -> ExqlResult<AnyObject> {
                let mut args = CtorArgs {
                    values: values.into_iter(),
                };
                Ok(Box::new(build(&mut args)?))
            }),
        };
        self
    }
}

/// Constructor arguments, consumed in declared parameter order.
pub struct CtorArgs {
    values: std::vec::IntoIter<Value>,
}

impl CtorArgs {
    pub fn next<V: FromValue>(&mut self) -> ExqlResult<V> {
        let value = self
            .values
            .next()
            .ok_or_else(|| ExqlError::shape("constructor received too few arguments"))?;
        V::from_value(value)
    }
}

/// Row object for models without a Rust type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    model: String,
    values: Vec<(String, Value)>,
}

impl Record {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            values: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

static REGISTRY: OnceLock<RwLock<HashMap<TypeId, ModelRef>>> = OnceLock::new();

/// Mapping for `T`, computed on first use and cached for the process.
pub fn model<T: Model>() -> ModelRef {
    let registry = REGISTRY.get_or_init(Default::default);
    let key = TypeId::of::<T>();

    if let Ok(cache) = registry.read() {
        if let Some(meta) = cache.get(&key) {
            return meta.clone();
        }
    }

    // Racing callers may both describe; the first insert wins.
    let meta = Arc::new(ModelMeta::describe::<T>());
    match registry.write() {
        Ok(mut cache) => cache.entry(key).or_insert(meta).clone(),
        Err(_) => meta,
    }
}

pub fn table_name<T: Model>() -> String {
    model::<T>().table().to_string()
}

pub fn field_list<T: Model>() -> Vec<String> {
    model::<T>().fields().iter().map(|f| f.name.clone()).collect()
}

pub fn field_to_column<T: Model>(field: &str) -> ExqlResult<String> {
    model::<T>().column_of(field).map(str::to_string)
}

pub fn primary_key_field<T: Model>() -> Option<String> {
    model::<T>().primary_key().map(str::to_string)
}

/// Read one column from the current cursor row, coerced to `target`.
pub fn read_value(cursor: &dyn Cursor, column: &str, target: Option<ValueType>) -> ExqlResult<Value> {
    let index = cursor
        .ordinal(column)
        .ok_or_else(|| ExqlError::shape(format!("column '{}' missing from result", column)))?;
    read_index(cursor, index, target)
}

pub(crate) fn read_index(cursor: &dyn Cursor, index: usize, target: Option<ValueType>) -> ExqlResult<Value> {
    if cursor.is_null(index) {
        return Ok(Value::Null);
    }
    // Drivers without native date or boolean columns hand back text and integers.
    match (cursor.value(index), target) {
        (Value::Text(text), Some(ValueType::DateTime)) => parse_datetime(&text).map(Value::DateTime),
        (Value::Int(n), Some(ValueType::Bool)) => Ok(Value::Bool(n != 0)),
        (value, Some(vt)) => value.coerce(vt),
        (value, None) => Ok(value),
    }
}
