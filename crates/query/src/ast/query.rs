//! Query descriptions.

use super::predicate::Where;
use crate::join::{IntoConnection, JoinDefinition};
use tessera_core::{Key, Result};

/// A join to attach to every record a query returns.
#[derive(Clone, Debug)]
pub struct QueryJoin {
    /// Name of a join registered with the store, or of the ad-hoc join.
    pub join_name: String,
    /// Join used in place of a registered one.
    pub definition: Option<JoinDefinition>,
    /// Field the joined value is attached under; defaults to the join name.
    pub alias: Option<String>,
    /// Filter applied to the foreign records.
    pub filter: Option<Where>,
    /// Joins applied to the foreign records before they are attached.
    pub joins: Vec<QueryJoin>,
}

impl QueryJoin {
    pub fn new(join_name: impl Into<String>) -> Self {
        Self {
            join_name: join_name.into(),
            definition: None,
            alias: None,
            filter: None,
            joins: Vec::new(),
        }
    }

    /// A join that is not registered with the store.
    pub fn ad_hoc(definition: JoinDefinition) -> Self {
        let join_name = match definition.name() {
            Some(name) => name.to_string(),
            None => definition.default_name(),
        };
        Self {
            definition: Some(definition),
            ..Self::new(join_name)
        }
    }

    /// An ad-hoc join between two connections, e.g. `("users.addID", "addr")`.
    pub fn connections(from: impl IntoConnection, to: impl IntoConnection) -> Result<Self> {
        Ok(Self::ad_hoc(JoinDefinition::between(from, to)?))
    }

    /// Attaches the result under `alias` instead of the join name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds a nested join.
    pub fn join(mut self, join: impl Into<QueryJoin>) -> Self {
        self.joins.push(join.into());
        self
    }

    /// Field name the joined value appears under.
    pub fn attach_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.join_name)
    }
}

impl From<&str> for QueryJoin {
    fn from(join_name: &str) -> Self {
        QueryJoin::new(join_name)
    }
}

impl From<String> for QueryJoin {
    fn from(join_name: String) -> Self {
        QueryJoin::new(join_name)
    }
}

/// A query over one table.
///
/// # Example
///
/// ```
/// use tessera_query::{Query, QueryJoin, Where};
///
/// let query = Query::new("users")
///     .filter(Where::field("age").gte(21))
///     .join(QueryJoin::new("home").join("stateInfo"));
/// assert_eq!(query.joins[0].attach_key(), "home");
/// ```
#[derive(Clone, Debug)]
pub struct Query {
    pub table_name: String,
    /// Restricts the base set to one key.
    pub key: Option<Key>,
    pub filter: Option<Where>,
    pub joins: Vec<QueryJoin>,
}

impl Query {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key: None,
            filter: None,
            joins: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn join(mut self, join: impl Into<QueryJoin>) -> Self {
        self.joins.push(join.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Value;

    #[test]
    fn test_query_builder() {
        let query = Query::new("users")
            .key(3)
            .join("home")
            .join(QueryJoin::new("userHats").alias("hats"));

        assert_eq!(query.table_name, "users");
        assert_eq!(query.key, Some(Value::Int(3)));
        assert!(query.filter.is_none());
        assert_eq!(query.joins.len(), 2);
        assert_eq!(query.joins[0].attach_key(), "home");
        assert_eq!(query.joins[1].attach_key(), "hats");
    }

    #[test]
    fn test_nested_joins() {
        let join = QueryJoin::new("home").join(QueryJoin::new("stateInfo").alias("state"));
        assert_eq!(join.joins.len(), 1);
        assert_eq!(join.joins[0].join_name, "stateInfo");
        assert_eq!(join.joins[0].attach_key(), "state");
    }

    #[test]
    fn test_ad_hoc_join() {
        let join = QueryJoin::connections("users.addID", "addr").unwrap();
        assert_eq!(join.attach_key(), "users_addID_addr");
        assert!(join.definition.is_some());

        let named = QueryJoin::ad_hoc(JoinDefinition::between("users", "pets.owner").unwrap().named("pets"));
        assert_eq!(named.attach_key(), "pets");

        assert!(QueryJoin::connections("users.", "addr").is_err());
        assert!(QueryJoin::new("home").definition.is_none());
    }
}
