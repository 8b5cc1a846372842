use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::repo::{ChildSpec, PivotSpec, RelationStore, StoreError};
use crate::config::SeedConfig;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Value>>,
    pivots: HashMap<String, Vec<BTreeMap<String, i64>>>,
}

/// In-process backend. Pivot rows are plain column maps so that a pivot
/// table can be shared by a relation and its inverse.
#[derive(Default)]
pub struct MemoryRelationStore {
    tables: Mutex<Tables>,
}

fn key_of(row: &Value, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl MemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: &SeedConfig) -> Self {
        let store = Self::new();
        for (table, rows) in &seed.rows {
            for row in rows {
                store.seed_row(table, row.clone());
            }
        }
        for (table, rows) in &seed.pivots {
            for row in rows {
                store.seed_pivot(table, row.clone());
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_row(&self, table: &str, row: Value) {
        self.lock()
            .rows
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn seed_pivot(&self, table: &str, row: BTreeMap<String, i64>) {
        self.lock()
            .pivots
            .entry(table.to_string())
            .or_default()
            .push(row);
    }
}

impl Tables {
    fn find(&self, table: &str, key: &str, id: i64) -> Option<&Value> {
        self.rows
            .get(table)?
            .iter()
            .find(|row| key_of(row, key) == Some(id))
    }

    fn related_keys(&self, pivot: &PivotSpec, owner: i64) -> Vec<i64> {
        let mut keys: Vec<i64> = self
            .pivots
            .get(&pivot.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get(&pivot.foreign_pivot_key) == Some(&owner))
                    .filter_map(|row| row.get(&pivot.related_pivot_key).copied())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }
}

#[async_trait]
impl RelationStore for MemoryRelationStore {
    async fn find(&self, table: &str, key: &str, id: i64) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().find(table, key, id).cloned())
    }

    async fn related_keys(&self, pivot: &PivotSpec, owner: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self.lock().related_keys(pivot, owner))
    }

    async fn insert_pivot(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        related: &[i64],
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        // All-or-nothing, like a single INSERT statement.
        if let Some(missing) = related
            .iter()
            .find(|key| tables.find(&pivot.related_table, &pivot.related_key, **key).is_none())
        {
            return Err(StoreError::ForeignKey {
                table: pivot.related_table.clone(),
                key: *missing,
            });
        }
        let rows = tables.pivots.entry(pivot.table.clone()).or_default();
        for key in related {
            rows.push(BTreeMap::from([
                (pivot.foreign_pivot_key.clone(), owner),
                (pivot.related_pivot_key.clone(), *key),
            ]));
        }
        Ok(())
    }

    async fn delete_pivot(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        related: &[i64],
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let Some(rows) = tables.pivots.get_mut(&pivot.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| {
            let owned = row.get(&pivot.foreign_pivot_key) == Some(&owner);
            let listed = row
                .get(&pivot.related_pivot_key)
                .is_some_and(|key| related.contains(key));
            !(owned && listed)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn related_page(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.lock();
        let keys = tables.related_keys(pivot, owner);
        let page = keys
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .filter_map(|key| {
                let mut row = match tables.find(&pivot.related_table, &pivot.related_key, key)? {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                let mut pivot_row = Map::new();
                pivot_row.insert(pivot.foreign_pivot_key.clone(), owner.into());
                pivot_row.insert(pivot.related_pivot_key.clone(), key.into());
                row.insert("pivot".into(), Value::Object(pivot_row));
                Some(Value::Object(row))
            })
            .collect();
        Ok(page)
    }

    async fn child_page(
        &self,
        child: &ChildSpec,
        owner: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.lock();
        let mut rows: Vec<&Value> = tables
            .rows
            .get(&child.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| key_of(row, &child.foreign_key) == Some(owner))
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|row| key_of(row, &child.key));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
