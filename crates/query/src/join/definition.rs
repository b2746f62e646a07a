//! Declarative joins between two tables.
//!
//! A `JoinDefinition` names two connections. Each connection names a table and,
//! optionally, the field on that table's records that holds the related key.
//! Connections may be written as shorthand (`"addr"` or `"users.addID"`); the
//! shorthand is parsed once, when the definition is built.

use std::fmt;
use std::str::FromStr;
use tessera_core::{Error, Result};

/// One side of a join.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JoinConnection {
    pub table_name: String,
    /// Field holding the related key. None means the record's own key.
    pub key: Option<String>,
    /// Column name this side uses in a many-to-many join table.
    pub join_table_field: Option<String>,
}

impl JoinConnection {
    /// A connection on a table's own keys.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key: None,
            join_table_field: None,
        }
    }

    /// A connection through a field of the table's records.
    pub fn keyed(table_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new(table_name)
        }
    }

    pub fn join_table_field(mut self, field: impl Into<String>) -> Self {
        self.join_table_field = Some(field.into());
        self
    }

    /// Column this side's keys are stored under in a join table.
    pub fn join_table_column(&self) -> &str {
        self.join_table_field.as_deref().unwrap_or(&self.table_name)
    }
}

impl FromStr for JoinConnection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let table = parts.next().unwrap_or_default().trim();
        let key = parts.next().map(str::trim);

        if table.is_empty() || parts.next().is_some() {
            return Err(Error::join(format!("malformed join connection: {:?}", s)));
        }
        match key {
            None => Ok(JoinConnection::new(table)),
            Some("") => Err(Error::join(format!("malformed join connection: {:?}", s))),
            Some(key) => Ok(JoinConnection::keyed(table, key)),
        }
    }
}

impl fmt::Display for JoinConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}.{}", self.table_name, key),
            None => write!(f, "{}", self.table_name),
        }
    }
}

/// Anything that can describe a join connection.
pub trait IntoConnection {
    fn into_connection(self) -> Result<JoinConnection>;
}

impl IntoConnection for JoinConnection {
    fn into_connection(self) -> Result<JoinConnection> {
        if self.table_name.is_empty() {
            return Err(Error::join("join connection without a table name"));
        }
        Ok(self)
    }
}

impl IntoConnection for &str {
    fn into_connection(self) -> Result<JoinConnection> {
        self.parse()
    }
}

impl IntoConnection for String {
    fn into_connection(self) -> Result<JoinConnection> {
        self.parse()
    }
}

impl IntoConnection for &String {
    fn into_connection(self) -> Result<JoinConnection> {
        self.parse()
    }
}

/// A relationship between two tables, optionally mediated by a join table.
///
/// # Example
///
/// ```
/// use tessera_query::JoinDefinition;
///
/// let home = JoinDefinition::between("users.addID", "addr").unwrap().named("home");
/// assert_eq!(home.name(), Some("home"));
/// assert_eq!(home.from().key.as_deref(), Some("addID"));
///
/// assert!(JoinDefinition::between("users.", "addr").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinDefinition {
    name: Option<String>,
    from: JoinConnection,
    to: JoinConnection,
    join_table_name: Option<String>,
}

impl JoinDefinition {
    pub fn between(from: impl IntoConnection, to: impl IntoConnection) -> Result<Self> {
        Ok(Self {
            name: None,
            from: from.into_connection()?,
            to: to.into_connection()?,
            join_table_name: None,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes the join many-to-many through a table of key pairs.
    ///
    /// Each side stores its keys under its own column, so two sides that
    /// resolve to the same column are rejected.
    pub fn through(mut self, join_table_name: impl Into<String>) -> Result<Self> {
        let join_table_name = join_table_name.into();
        if self.from.join_table_column() == self.to.join_table_column() {
            return Err(Error::join(format!(
                "join table {:?} needs distinct columns, both sides use {:?}",
                join_table_name,
                self.from.join_table_column()
            )));
        }
        self.join_table_name = Some(join_table_name);
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn from(&self) -> &JoinConnection {
        &self.from
    }

    pub fn to(&self) -> &JoinConnection {
        &self.to
    }

    pub fn join_table_name(&self) -> Option<&str> {
        self.join_table_name.as_deref()
    }

    pub fn is_many_to_many(&self) -> bool {
        self.join_table_name.is_some()
    }

    /// Name derived from the connections, used when none was given.
    pub fn default_name(&self) -> String {
        let side = |conn: &JoinConnection| match &conn.key {
            Some(key) => format!("{}_{}", conn.table_name, key),
            None => conn.table_name.clone(),
        };
        format!("{}_{}", side(&self.from), side(&self.to))
    }

    /// Splits the connections into (local, foreign) as seen from `table`.
    ///
    /// The `from` side wins when both connections name the same table.
    pub fn sides_for(&self, table: &str) -> Option<(&JoinConnection, &JoinConnection)> {
        if self.from.table_name == table {
            Some((&self.from, &self.to))
        } else if self.to.table_name == table {
            Some((&self.to, &self.from))
        } else {
            None
        }
    }
}
