//! Programmatic store configuration.
//!
//! Tables and joins are described with small builders and handed to
//! [`create_store`](crate::create_store):
//!
//! ```
//! use serde_json::json;
//! use tessera_database::{create_store, StoreOptions, TableDefinition};
//! use tessera_query::JoinDefinition;
//!
//! let store = create_store(
//!     vec![
//!         TableDefinition::new("users").rows(vec![json!({ "name": "Bob", "addID": 10 })]),
//!         TableDefinition::new("addr")
//!             .key_field("id")
//!             .rows(vec![json!({ "id": 10, "city": "Oakland" })]),
//!     ],
//!     StoreOptions::new().join(JoinDefinition::between("users.addID", "addr")?.named("home")),
//! )?;
//! assert_eq!(store.table("users").len(), 1);
//! # Ok::<(), tessera_core::Error>(())
//! ```

use std::fmt;
use std::rc::Rc;
use tessera_core::{Key, Value};
use tessera_query::JoinDefinition;

/// Extra input to `Table::add`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddMeta {
    /// Explicit key; wins over the key provider.
    pub key: Option<Key>,
    /// Free-form data passed through to the key provider and data creator.
    pub extra: Value,
}

impl AddMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<Key>) -> Self {
        Self {
            key: Some(key.into()),
            extra: Value::Null,
        }
    }

    pub fn extra(mut self, extra: impl Into<Value>) -> Self {
        self.extra = extra.into();
        self
    }
}

/// Assigns a key to a new value: `(value, table_name, meta)`.
pub type KeyProvider = Rc<dyn Fn(&Value, &str, Option<&AddMeta>) -> Option<Key>>;

/// Validates or transforms a value before it is stored. An `Err` rejects it.
pub type DataCreator = Rc<dyn Fn(Value, Option<&AddMeta>) -> Result<Value, String>>;

/// Description of one table.
#[derive(Clone)]
pub struct TableDefinition {
    pub(crate) name: String,
    pub(crate) key_field: Option<String>,
    pub(crate) key_provider: Option<KeyProvider>,
    pub(crate) data_creator: Option<DataCreator>,
    pub(crate) rows: Vec<Value>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: None,
            key_provider: None,
            data_creator: None,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys records by one of their fields.
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Replaces the default key provider.
    pub fn key_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn(&Value, &str, Option<&AddMeta>) -> Option<Key> + 'static,
    {
        self.key_provider = Some(Rc::new(provider));
        self
    }

    pub fn data_creator<F>(mut self, creator: F) -> Self
    where
        F: Fn(Value, Option<&AddMeta>) -> Result<Value, String> + 'static,
    {
        self.data_creator = Some(Rc::new(creator));
        self
    }

    /// Initial rows, added when the table is defined.
    pub fn rows<I, V>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.extend(rows.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDefinition")
            .field("name", &self.name)
            .field("key_field", &self.key_field)
            .field("key_provider", &self.key_provider.is_some())
            .field("data_creator", &self.data_creator.is_some())
            .field("rows", &self.rows.len())
            .finish()
    }
}

/// Store-wide options.
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    pub(crate) joins: Vec<JoinDefinition>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(mut self, join: JoinDefinition) -> Self {
        self.joins.push(join);
        self
    }

    pub fn joins<I: IntoIterator<Item = JoinDefinition>>(mut self, joins: I) -> Self {
        self.joins.extend(joins);
        self
    }
}
