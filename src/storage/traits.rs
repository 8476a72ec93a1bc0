//! Storage trait definitions and filter types.

use crate::error::Result;
use serde::{Serialize, de::DeserializeOwned};

/// Filter operations for querying records.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals value
    Eq,
    /// Field does not equal value
    Ne,
    /// Field contains value (string/array)
    Contains,
}

/// A filter over the top-level fields of a stored record.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

impl Filter {
    fn with(field: impl Into<String>, op: FilterOp, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op,
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::with(field, FilterOp::Eq, value)
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::with(field, FilterOp::Ne, value)
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::with(field, FilterOp::Contains, value)
    }

    /// Check if a record matches this filter.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        let field_value = record.get(&self.field);

        match &self.op {
            FilterOp::Eq => match field_value {
                Some(v) => *v == self.value,
                None => self.value.is_null(),
            },
            FilterOp::Ne => match field_value {
                Some(v) => *v != self.value,
                None => !self.value.is_null(),
            },
            FilterOp::Contains => match (field_value, &self.value) {
                (Some(serde_json::Value::String(s)), serde_json::Value::String(needle)) => s.contains(needle.as_str()),
                (Some(serde_json::Value::Array(arr)), needle) => arr.contains(needle),
                _ => false,
            },
        }
    }
}

/// Records addressable by a string id.
pub trait HasId {
    fn id(&self) -> &str;
}

/// Collection-oriented record storage.
pub trait Storage: Send + Sync {
    /// Create a new record.
    fn create<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()>;

    /// Get a record by ID.
    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>>;

    /// Replace an existing record. Fails with `PlanNotFound` when absent.
    fn update<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()>;

    /// Delete a record by ID.
    fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Query records with filters.
    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>>;

    /// List all records in a collection.
    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }

    /// Create the record, or replace it if one with the same id exists.
    fn upsert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let existing: Option<serde_json::Value> = self.get(collection, record.id())?;
        match existing {
            Some(_) => self.update(collection, record),
            None => self.create(collection, record),
        }
    }
}
