//! Column definition.

use crate::types::DataType;
use crate::value::Value;

/// A column definition in a table schema.
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
    default_value: Option<Value>,
    /// Position in the table (0-based).
    index: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: data_type.is_nullable_by_default(),
            default_value: None,
            index: 0,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value written by `SET DEFAULT`: the declared default, else null for a
    /// nullable column, else the type's zero value.
    pub fn get_default_value(&self) -> Value {
        match &self.default_value {
            Some(v) => v.clone(),
            None if self.nullable => Value::Null,
            None => self.data_type.zero_value(),
        }
    }
}
