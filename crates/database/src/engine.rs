//! Query engine.
//!
//! Evaluation runs in three steps: the base set (one key, or the whole table
//! in key order), the where filter, then each join. A join resolves the
//! foreign records for the surviving local set in one pass, applies its own
//! filter and nested joins to those foreign records, and attaches them to
//! every local record as snapshots. Singular joins attach one record or none.

use crate::record::{Attachment, Record};
use crate::store::Store;
use hashbrown::HashMap;
use tessera_core::{Error, Key, Result, Value};
use tessera_query::{JoinResolver, JoinSource, JoinedRecords, Query, QueryJoin, RecordView, Where};
use tracing::trace;

/// Borrowed (key, value) pair seen through `RecordView`.
struct Row<'a> {
    key: &'a Key,
    value: &'a Value,
}

impl RecordView for Row<'_> {
    fn key(&self) -> &Key {
        self.key
    }

    fn data(&self) -> Option<Value> {
        Some(self.value.clone())
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.value.get(field).cloned()
    }
}

fn filter_rows(rows: Vec<(Key, Value)>, filter: Option<&Where>) -> Vec<(Key, Value)> {
    match filter {
        None => rows,
        Some(filter) => rows
            .into_iter()
            .filter(|(key, value)| filter.matches(&Row { key, value }))
            .collect(),
    }
}

pub(crate) fn run(store: &Store, query: &Query) -> Result<Vec<Record>> {
    if !store.has_table(&query.table_name) {
        return Err(Error::query(format!("unknown table: {}", query.table_name)));
    }

    let base: Vec<(Key, Value)> = match &query.key {
        Some(key) => store.fetch(&query.table_name, std::slice::from_ref(key)),
        None => store.scan(&query.table_name),
    };
    let rows = filter_rows(base, query.filter.as_ref());
    trace!(table = %query.table_name, matched = rows.len(), "query filtered");

    let mut records: Vec<Record> = rows
        .iter()
        .map(|(key, _)| Record::live(store.clone(), &query.table_name, key.clone()))
        .collect();
    attach_joins(store, &query.table_name, &rows, &mut records, &query.joins)?;
    Ok(records)
}

/// Attaches `joins` to `records`, which hold the rows of `table` in `rows` order.
fn attach_joins(
    store: &Store,
    table: &str,
    rows: &[(Key, Value)],
    records: &mut [Record],
    joins: &[QueryJoin],
) -> Result<()> {
    for join in joins {
        let def = match &join.definition {
            Some(def) => def.clone(),
            None => store.require_join(&join.join_name)?,
        };
        let resolver = JoinResolver::new(&def, table, store)?;
        let JoinedRecords { by_local, foreign } = resolver.resolve(store, rows)?;
        let foreign_table = resolver.foreign_table();

        let foreign_rows = filter_rows(foreign.into_iter().collect(), join.filter.as_ref());
        let mut foreign_records: Vec<Record> = foreign_rows
            .iter()
            .map(|(key, value)| Record::snapshot(store.clone(), foreign_table, key.clone(), value.clone()))
            .collect();
        if !join.joins.is_empty() {
            attach_joins(store, foreign_table, &foreign_rows, &mut foreign_records, &join.joins)?;
        }
        let by_key: HashMap<&Key, &Record> = foreign_rows
            .iter()
            .map(|(key, _)| key)
            .zip(foreign_records.iter())
            .collect();

        let plural = resolver.foreign_is_plural();
        for record in records.iter_mut() {
            let matched: Vec<Record> = by_local
                .get(record.key())
                .map(|keys| {
                    keys.iter()
                        .filter_map(|key| by_key.get(key).map(|r| (*r).clone()))
                        .collect()
                })
                .unwrap_or_default();
            let attachment = if plural {
                Attachment::Many(matched)
            } else {
                Attachment::One(matched.into_iter().next().map(Box::new))
            };
            record.add_join(join.attach_key(), attachment);
        }
        trace!(
            join = %join.join_name,
            form = ?resolver.form(),
            local = records.len(),
            foreign = foreign_records.len(),
            "attached join"
        );
    }
    Ok(())
}

impl JoinSource for Store {
    fn key_field(&self, table: &str) -> Option<String> {
        self.existing_table(table).and_then(|state| state.key_field())
    }

    fn scan(&self, table: &str) -> Vec<(Key, Value)> {
        let Some(state) = self.existing_table(table) else {
            return Vec::new();
        };
        let data = state.data.borrow();
        let rows = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        rows
    }

    fn fetch(&self, table: &str, keys: &[Key]) -> Vec<(Key, Value)> {
        let Some(state) = self.existing_table(table) else {
            return Vec::new();
        };
        let data = state.data.borrow();
        let rows = keys
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_query::JoinDefinition;

    fn store() -> Store {
        let store = Store::new();
        let users = store.table("users");
        users.add(json!({ "name": "Bob", "age": 40, "addID": 10 }), None).unwrap();
        users.add(json!({ "name": "Sal", "age": 25 }), None).unwrap();
        store.table("addr").set(10, json!({ "city": "Oakland" })).unwrap();
        store
            .add_join(JoinDefinition::between("users.addID", "addr").unwrap().named("home"))
            .unwrap();
        store
    }

    #[test]
    fn test_unknown_table() {
        let store = Store::new();
        assert!(matches!(run(&store, &Query::new("ghosts")), Err(Error::Query { .. })));
    }

    #[test]
    fn test_key_lookup() {
        let store = store();
        let found = run(&store, &Query::new("users").key(2)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("name"), Some(Value::from("Sal")));
        assert!(run(&store, &Query::new("users").key(99)).unwrap().is_empty());
    }

    #[test]
    fn test_where_filter() {
        let store = store();
        let found = run(&store, &Query::new("users").filter(Where::field("age").gt(30))).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key(), &Value::Int(1));
    }

    #[test]
    fn test_singular_join_unwraps() {
        let store = store();
        let found = run(&store, &Query::new("users").join("home")).unwrap();
        assert_eq!(found[0].value().get("home"), Some(&Value::from(json!({ "city": "Oakland" }))));
        assert_eq!(found[1].value().get("home"), Some(&Value::Null));
    }

    #[test]
    fn test_join_alias_and_filter() {
        let store = store();
        let join = QueryJoin::new("home")
            .alias("address")
            .filter(Where::field("city").eq("Boston"));
        let found = run(&store, &Query::new("users").key(1).join(join)).unwrap();
        let value = found[0].value();
        assert_eq!(value.get("address"), Some(&Value::Null));
        assert!(!value.has_field("home"));
    }

    #[test]
    fn test_unknown_join_fails() {
        let store = store();
        let err = run(&store, &Query::new("users").join("nope")).unwrap_err();
        assert!(matches!(err, Error::Join { .. }));
    }
}
