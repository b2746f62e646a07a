//! Join resolution.
//!
//! A `JoinResolver` looks at a `JoinDefinition` from the side of one table and
//! classifies how the two connections relate (`JoinForm`). Given a set of local
//! records it then finds the foreign records each one joins to. Every form
//! is resolved with at most one pass over each table involved, bucketing keys
//! in hash maps so the cost stays O(local + foreign).

use super::definition::{JoinConnection, JoinDefinition};
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;
use tessera_core::{Error, Key, Result, Value};
use tracing::trace;

/// Read access to the tables a join spans.
pub trait JoinSource {
    /// The field a table's records are keyed by, if any.
    fn key_field(&self, table: &str) -> Option<String>;

    /// Every record of a table, in table order.
    fn scan(&self, table: &str) -> Vec<(Key, Value)>;

    /// The records stored under `keys`; missing keys are skipped.
    fn fetch(&self, table: &str, keys: &[Key]) -> Vec<(Key, Value)> {
        let wanted: HashSet<&Key> = keys.iter().collect();
        self.scan(table)
            .into_iter()
            .filter(|(key, _)| wanted.contains(key))
            .collect()
    }
}

/// How the two sides of a join relate, seen from the local table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinForm {
    /// Local key equals foreign key.
    KeyToKey,
    /// A local field holds the foreign key.
    FromForeignKey,
    /// A foreign field holds the local key.
    ToForeignKey,
    /// A local field equals a foreign field.
    ForeignToForeignKey,
    /// Key pairs stored in a join table.
    ManyToMany,
    /// The local table is not part of the join.
    BadJoin,
}

impl JoinForm {
    /// Classifies a join from `table`'s side.
    pub fn classify(def: &JoinDefinition, table: &str, source: &dyn JoinSource) -> JoinForm {
        let Some((local, foreign)) = def.sides_for(table) else {
            return JoinForm::BadJoin;
        };
        if def.is_many_to_many() {
            return JoinForm::ManyToMany;
        }
        match (
            effective_key(local, source).is_some(),
            effective_key(foreign, source).is_some(),
        ) {
            (true, true) => JoinForm::ForeignToForeignKey,
            (true, false) => JoinForm::FromForeignKey,
            (false, true) => JoinForm::ToForeignKey,
            (false, false) => JoinForm::KeyToKey,
        }
    }
}

/// A connection's key field, unless it is just the table's own key field.
fn effective_key(conn: &JoinConnection, source: &dyn JoinSource) -> Option<String> {
    let key = conn.key.as_ref()?;
    match source.key_field(&conn.table_name) {
        Some(key_field) if &key_field == key => None,
        _ => Some(key.clone()),
    }
}

/// Foreign records found for a local record set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoinedRecords {
    /// Local key → the foreign keys it joins to, in match order.
    pub by_local: HashMap<Key, Vec<Key>>,
    /// Every foreign record matched by any local record.
    pub foreign: BTreeMap<Key, Value>,
}

impl JoinedRecords {
    /// The foreign records joined to one local key.
    pub fn foreign_for(&self, local_key: &Key) -> Vec<(&Key, &Value)> {
        self.by_local
            .get(local_key)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.foreign.get_key_value(key))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.foreign.is_empty()
    }

    fn link(&mut self, local_key: &Key, foreign_key: &Key) {
        let keys = self.by_local.entry(local_key.clone()).or_default();
        if !keys.contains(foreign_key) {
            keys.push(foreign_key.clone());
        }
    }

    /// Drops links to foreign keys that were not found.
    fn prune(&mut self) {
        let foreign = &self.foreign;
        self.by_local.retain(|_, keys| {
            keys.retain(|key| foreign.contains_key(key));
            !keys.is_empty()
        });
    }
}

/// A join definition bound to one local table.
#[derive(Clone, Debug)]
pub struct JoinResolver {
    form: JoinForm,
    local: JoinConnection,
    foreign: JoinConnection,
    local_key: Option<String>,
    foreign_key: Option<String>,
    join_table: Option<String>,
}

impl JoinResolver {
    pub fn new(def: &JoinDefinition, table: &str, source: &dyn JoinSource) -> Result<Self> {
        let form = JoinForm::classify(def, table, source);
        let Some((local, foreign)) = def.sides_for(table) else {
            return Err(Error::join(format!(
                "join {} does not involve table {}",
                def.name().map(str::to_string).unwrap_or_else(|| def.default_name()),
                table
            )));
        };
        Ok(Self {
            form,
            local_key: effective_key(local, source),
            foreign_key: effective_key(foreign, source),
            local: local.clone(),
            foreign: foreign.clone(),
            join_table: def.join_table_name().map(str::to_string),
        })
    }

    pub fn form(&self) -> JoinForm {
        self.form
    }

    pub fn local(&self) -> &JoinConnection {
        &self.local
    }

    pub fn foreign(&self) -> &JoinConnection {
        &self.foreign
    }

    pub fn foreign_table(&self) -> &str {
        &self.foreign.table_name
    }

    /// Local field holding the related key, when it is not the table's key field.
    pub fn local_key(&self) -> Option<&str> {
        self.local_key.as_deref()
    }

    /// Foreign field holding the related key, when it is not the table's key field.
    pub fn foreign_key(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }

    pub fn join_table(&self) -> Option<&str> {
        self.join_table.as_deref()
    }

    /// True when a local record can join to many foreign records.
    pub fn foreign_is_plural(&self) -> bool {
        self.foreign_key.is_some() || self.form == JoinForm::ManyToMany
    }

    /// Finds the foreign records joined to each of `local`.
    pub fn resolve(&self, source: &dyn JoinSource, local: &[(Key, Value)]) -> Result<JoinedRecords> {
        let joined = match self.form {
            JoinForm::KeyToKey => self.key_to_key(source, local),
            JoinForm::FromForeignKey => self.from_foreign_key(source, local),
            JoinForm::ToForeignKey => self.to_foreign_key(source, local),
            JoinForm::ForeignToForeignKey => self.foreign_to_foreign_key(source, local),
            JoinForm::ManyToMany => self.many_to_many(source, local),
            JoinForm::BadJoin => {
                return Err(Error::join(format!(
                    "cannot resolve join from {} to {}",
                    self.local, self.foreign
                )))
            }
        };
        trace!(
            form = ?self.form,
            local = local.len(),
            foreign = joined.foreign.len(),
            "resolved join"
        );
        Ok(joined)
    }

    fn fetch_into(&self, source: &dyn JoinSource, keys: &[Key], joined: &mut JoinedRecords) {
        if keys.is_empty() {
            return;
        }
        joined
            .foreign
            .extend(source.fetch(&self.foreign.table_name, keys));
        joined.prune();
    }

    fn key_to_key(&self, source: &dyn JoinSource, local: &[(Key, Value)]) -> JoinedRecords {
        let mut joined = JoinedRecords::default();
        let keys: Vec<Key> = local.iter().map(|(key, _)| key.clone()).collect();
        for key in &keys {
            joined.link(key, key);
        }
        self.fetch_into(source, &keys, &mut joined);
        joined
    }

    fn from_foreign_key(&self, source: &dyn JoinSource, local: &[(Key, Value)]) -> JoinedRecords {
        let mut joined = JoinedRecords::default();
        let Some(field) = self.local_key.as_deref() else {
            return joined;
        };

        let mut wanted: Vec<Key> = Vec::new();
        let mut seen: HashSet<Key> = HashSet::new();
        for (key, value) in local {
            match value.get(field) {
                Some(foreign_key) if !foreign_key.is_null() => {
                    joined.link(key, foreign_key);
                    if seen.insert(foreign_key.clone()) {
                        wanted.push(foreign_key.clone());
                    }
                }
                _ => {}
            }
        }
        self.fetch_into(source, &wanted, &mut joined);
        joined
    }

    fn to_foreign_key(&self, source: &dyn JoinSource, local: &[(Key, Value)]) -> JoinedRecords {
        let mut joined = JoinedRecords::default();
        let Some(field) = self.foreign_key.as_deref() else {
            return joined;
        };

        let local_keys: HashSet<&Key> = local.iter().map(|(key, _)| key).collect();
        for (foreign_key, value) in source.scan(&self.foreign.table_name) {
            let Some(local_key) = value.get(field) else {
                continue;
            };
            if local_keys.contains(local_key) {
                joined.link(local_key, &foreign_key);
                joined.foreign.insert(foreign_key, value);
            }
        }
        joined
    }

    fn foreign_to_foreign_key(&self, source: &dyn JoinSource, local: &[(Key, Value)]) -> JoinedRecords {
        let mut joined = JoinedRecords::default();
        let (Some(local_field), Some(foreign_field)) =
            (self.local_key.as_deref(), self.foreign_key.as_deref())
        else {
            return joined;
        };

        let mut buckets: HashMap<&Value, Vec<&Key>> = HashMap::with_capacity(local.len());
        for (key, value) in local {
            if let Some(shared) = value.get(local_field).filter(|v| !v.is_null()) {
                buckets.entry(shared).or_default().push(key);
            }
        }
        if buckets.is_empty() {
            return joined;
        }

        for (foreign_key, value) in source.scan(&self.foreign.table_name) {
            let Some(local_keys) = value.get(foreign_field).and_then(|v| buckets.get(v)) else {
                continue;
            };
            for local_key in local_keys {
                joined.link(local_key, &foreign_key);
            }
            joined.foreign.insert(foreign_key, value);
        }
        joined
    }

    fn many_to_many(&self, source: &dyn JoinSource, local: &[(Key, Value)]) -> JoinedRecords {
        let mut joined = JoinedRecords::default();
        let Some(join_table) = self.join_table.as_deref() else {
            return joined;
        };
        let local_column = self.local.join_table_column();
        let foreign_column = self.foreign.join_table_column();

        let local_keys: HashSet<&Key> = local.iter().map(|(key, _)| key).collect();
        let mut wanted: Vec<Key> = Vec::new();
        let mut seen: HashSet<Key> = HashSet::new();
        for (_, pair) in source.scan(join_table) {
            let (Some(local_key), Some(foreign_key)) = (pair.get(local_column), pair.get(foreign_column))
            else {
                continue;
            };
            if !local_keys.contains(local_key) {
                continue;
            }
            joined.link(local_key, foreign_key);
            if seen.insert(foreign_key.clone()) {
                wanted.push(foreign_key.clone());
            }
        }
        self.fetch_into(source, &wanted, &mut joined);
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Tables {
        tables: HashMap<String, (Option<String>, BTreeMap<Key, Value>)>,
    }

    impl Tables {
        fn table(mut self, name: &str, key_field: Option<&str>, rows: Vec<(i64, serde_json::Value)>) -> Self {
            let data = rows
                .into_iter()
                .map(|(key, value)| (Value::Int(key), Value::from(value)))
                .collect();
            self.tables
                .insert(name.to_string(), (key_field.map(str::to_string), data));
            self
        }

        fn rows(&self, name: &str) -> Vec<(Key, Value)> {
            self.scan(name)
        }
    }

    impl JoinSource for Tables {
        fn key_field(&self, table: &str) -> Option<String> {
            self.tables.get(table).and_then(|(field, _)| field.clone())
        }

        fn scan(&self, table: &str) -> Vec<(Key, Value)> {
            self.tables
                .get(table)
                .map(|(_, data)| data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()
        }
    }

    fn fixture() -> Tables {
        Tables::default()
            .table(
                "users",
                None,
                vec![
                    (1, json!({ "name": "Bob", "addID": 10, "team": "red" })),
                    (2, json!({ "name": "Sal", "addID": 11, "team": "blue" })),
                    (3, json!({ "name": "Ann", "team": "red" })),
                ],
            )
            .table(
                "addr",
                Some("id"),
                vec![
                    (10, json!({ "id": 10, "city": "Oakland" })),
                    (11, json!({ "id": 11, "city": "Boston" })),
                ],
            )
            .table(
                "pets",
                None,
                vec![
                    (100, json!({ "owner": 1, "kind": "cat" })),
                    (101, json!({ "owner": 1, "kind": "dog" })),
                    (102, json!({ "owner": 2, "kind": "fish" })),
                ],
            )
            .table(
                "teams",
                None,
                vec![
                    (7, json!({ "color": "red", "size": 2 })),
                    (8, json!({ "color": "green", "size": 0 })),
                ],
            )
            .table("hats", None, vec![(50, json!("white")), (51, json!("black"))])
            .table(
                "user_hats",
                None,
                vec![
                    (1, json!({ "users": 1, "hats": 50 })),
                    (2, json!({ "users": 1, "hats": 51 })),
                    (3, json!({ "users": 3, "hats": 50 })),
                ],
            )
    }

    #[test]
    fn test_classify_forms() {
        let tables = fixture();
        let cases = [
            (JoinDefinition::between("users.addID", "addr").unwrap(), JoinForm::FromForeignKey),
            (JoinDefinition::between("users", "pets.owner").unwrap(), JoinForm::ToForeignKey),
            (JoinDefinition::between("users.team", "teams.color").unwrap(), JoinForm::ForeignToForeignKey),
            (JoinDefinition::between("users", "hats").unwrap(), JoinForm::KeyToKey),
            (JoinDefinition::between("users", "hats").unwrap().through("user_hats").unwrap(), JoinForm::ManyToMany),
            (JoinDefinition::between("pets", "hats").unwrap(), JoinForm::BadJoin),
        ];
        for (def, form) in cases {
            assert_eq!(JoinForm::classify(&def, "users", &tables), form, "{:?}", def);
        }
    }

    #[test]
    fn test_key_field_connection_counts_as_keyless() {
        let tables = fixture();
        let def = JoinDefinition::between("users.addID", "addr.id").unwrap();
        let resolver = JoinResolver::new(&def, "users", &tables).unwrap();
        assert_eq!(resolver.form(), JoinForm::FromForeignKey);
        assert_eq!(resolver.foreign_key(), None);
        assert!(!resolver.foreign_is_plural());
    }

    #[test]
    fn test_unrelated_table_is_a_join_error() {
        let tables = fixture();
        let def = JoinDefinition::between("pets", "hats").unwrap().named("petHats");
        let err = JoinResolver::new(&def, "users", &tables).unwrap_err();
        assert!(matches!(err, Error::Join { .. }));
    }

    #[test]
    fn test_from_foreign_key() {
        let tables = fixture();
        let def = JoinDefinition::between("users.addID", "addr").unwrap();
        let resolver = JoinResolver::new(&def, "users", &tables).unwrap();
        let joined = resolver.resolve(&tables, &tables.rows("users")).unwrap();

        assert_eq!(joined.foreign.len(), 2);
        let bob = joined.foreign_for(&Value::Int(1));
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].1.get("city"), Some(&Value::from("Oakland")));
        // Ann has no addID
        assert!(joined.foreign_for(&Value::Int(3)).is_empty());
    }

    #[test]
    fn test_to_foreign_key_is_plural() {
        let tables = fixture();
        let def = JoinDefinition::between("users", "pets.owner").unwrap();
        let resolver = JoinResolver::new(&def, "users", &tables).unwrap();
        assert!(resolver.foreign_is_plural());

        let joined = resolver.resolve(&tables, &tables.rows("users")).unwrap();
        let kinds: Vec<&Value> = joined
            .foreign_for(&Value::Int(1))
            .into_iter()
            .filter_map(|(_, pet)| pet.get("kind"))
            .collect();
        assert_eq!(kinds, vec![&Value::from("cat"), &Value::from("dog")]);
        assert_eq!(joined.foreign_for(&Value::Int(2)).len(), 1);
    }

    #[test]
    fn test_reverse_direction() {
        let tables = fixture();
        let def = JoinDefinition::between("users", "pets.owner").unwrap();
        let resolver = JoinResolver::new(&def, "pets", &tables).unwrap();
        assert_eq!(resolver.form(), JoinForm::FromForeignKey);
        assert!(!resolver.foreign_is_plural());

        let joined = resolver.resolve(&tables, &tables.rows("pets")).unwrap();
        let owner = joined.foreign_for(&Value::Int(102));
        assert_eq!(owner[0].0, &Value::Int(2));
    }

    #[test]
    fn test_foreign_to_foreign_key() {
        let tables = fixture();
        let def = JoinDefinition::between("users.team", "teams.color").unwrap();
        let resolver = JoinResolver::new(&def, "users", &tables).unwrap();
        let joined = resolver.resolve(&tables, &tables.rows("users")).unwrap();

        assert_eq!(joined.foreign_for(&Value::Int(1))[0].0, &Value::Int(7));
        assert_eq!(joined.foreign_for(&Value::Int(3))[0].0, &Value::Int(7));
        assert!(joined.foreign_for(&Value::Int(2)).is_empty());
        assert_eq!(joined.foreign.len(), 1);
    }

    #[test]
    fn test_many_to_many() {
        let tables = fixture();
        let def = JoinDefinition::between("users", "hats").unwrap().through("user_hats").unwrap();
        let resolver = JoinResolver::new(&def, "users", &tables).unwrap();
        assert!(resolver.foreign_is_plural());

        let local: Vec<(Key, Value)> = tables
            .rows("users")
            .into_iter()
            .filter(|(key, _)| key != &Value::Int(3))
            .collect();
        let joined = resolver.resolve(&tables, &local).unwrap();
        let hats: Vec<&Value> = joined
            .foreign_for(&Value::Int(1))
            .into_iter()
            .map(|(_, hat)| hat)
            .collect();
        assert_eq!(hats, vec![&Value::from("white"), &Value::from("black")]);
        // user 3 was not in the local set
        assert!(!joined.by_local.contains_key(&Value::Int(3)));
    }

    #[test]
    fn test_key_to_key_skips_missing() {
        let tables = fixture();
        let def = JoinDefinition::between("users", "pets").unwrap();
        let resolver = JoinResolver::new(&def, "users", &tables).unwrap();
        let joined = resolver.resolve(&tables, &tables.rows("users")).unwrap();
        assert!(joined.is_empty());
        assert!(joined.by_local.is_empty());
    }
}
