use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Collection, Document, DocumentStore, FieldFilter, UserId};
use crate::error::{StoreError, StoreResult};
use crate::models::RecordId;

/// Document storage backed by a single SQLite table.
///
/// This is what `nosh serve` persists to. Each row is one JSON document keyed
/// by `(user, collection, id)`.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open document store: {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                    user TEXT NOT NULL,
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user, collection, id)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }
}

fn decode_body(body: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Remote("stored document is not an object".to_string())),
    }
}

fn not_found(collection: Collection, id: &str) -> StoreError {
    StoreError::NotFound {
        entity: collection.entity_name(),
        id: RecordId::from(id),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(
        &self,
        user: &UserId,
        collection: Collection,
        body: Map<String, Value>,
    ) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO documents (user, collection, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                user.as_str(),
                collection.as_str(),
                id,
                Value::Object(body).to_string(),
                now,
            ],
        )?;
        Ok(id)
    }

    async fn get(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<Map<String, Value>>> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM documents WHERE user = ?1 AND collection = ?2 AND id = ?3",
                params![user.as_str(), collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        body.as_deref().map(decode_body).transpose()
    }

    async fn replace(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
        body: Map<String, Value>,
    ) -> StoreResult<()> {
        let rows = self.conn().execute(
            "UPDATE documents SET body = ?4, updated_at = ?5
             WHERE user = ?1 AND collection = ?2 AND id = ?3",
            params![
                user.as_str(),
                collection.as_str(),
                id,
                Value::Object(body).to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if rows == 0 {
            return Err(not_found(collection, id));
        }
        Ok(())
    }

    async fn merge(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE user = ?1 AND collection = ?2 AND id = ?3",
                params![user.as_str(), collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        let mut body = existing.as_deref().map(decode_body).transpose()?.unwrap_or_default();
        body.extend(fields);

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO documents (user, collection, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user, collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![
                user.as_str(),
                collection.as_str(),
                id,
                Value::Object(body).to_string(),
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, user: &UserId, collection: Collection, id: &str) -> StoreResult<()> {
        self.conn().execute(
            "DELETE FROM documents WHERE user = ?1 AND collection = ?2 AND id = ?3",
            params![user.as_str(), collection.as_str(), id],
        )?;
        Ok(())
    }

    async fn list(
        &self,
        user: &UserId,
        collection: Collection,
        filter: Option<&FieldFilter>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let conn = self.conn();
        let rows: Vec<(String, String)> = match filter {
            Some(f) => {
                if !FieldFilter::is_valid_field(&f.field) {
                    return Err(StoreError::InvalidQuery(format!(
                        "invalid filter field '{}'",
                        f.field
                    )));
                }
                let mut stmt = conn.prepare(
                    "SELECT id, body FROM documents
                     WHERE user = ?1 AND collection = ?2 AND json_extract(body, ?3) = ?4
                     ORDER BY id LIMIT ?5",
                )?;
                stmt.query_map(
                    params![
                        user.as_str(),
                        collection.as_str(),
                        format!("$.{}", f.field),
                        f.value,
                        limit,
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?
                .collect::<Result<_, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, body FROM documents
                     WHERE user = ?1 AND collection = ?2
                     ORDER BY id LIMIT ?3",
                )?;
                stmt.query_map(
                    params![user.as_str(), collection.as_str(), limit],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?
                .collect::<Result<_, _>>()?
            }
        };

        rows.into_iter()
            .map(|(id, body)| Ok((id, decode_body(&body)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let alice = user("alice");
        let id = store
            .insert(&alice, Collection::Meals, object(json!({"date": "2024-06-15"})))
            .await
            .unwrap();

        let doc = store.get(&alice, Collection::Meals, &id).await.unwrap().unwrap();
        assert_eq!(doc["date"], "2024-06-15");
        assert!(store.get(&alice, Collection::Recipes, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let id = store
            .insert(&user("alice"), Collection::Meals, object(json!({"x": 1})))
            .await
            .unwrap();

        let bob = user("bob");
        assert!(store.get(&bob, Collection::Meals, &id).await.unwrap().is_none());
        assert!(store.list(&bob, Collection::Meals, None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let err = store
            .replace(&user("alice"), Collection::Meals, "nope", Map::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "No meal with id nope");
    }

    #[tokio::test]
    async fn test_merge_creates_then_overlays() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let alice = user("alice");
        store
            .merge(&alice, Collection::Settings, "profile", object(json!({"a": 1, "b": 2})))
            .await
            .unwrap();
        store
            .merge(&alice, Collection::Settings, "profile", object(json!({"b": 3})))
            .await
            .unwrap();

        let doc = store
            .get(&alice, Collection::Settings, "profile")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["a"], 1);
        assert_eq!(doc["b"], 3);
    }

    #[tokio::test]
    async fn test_list_with_filter_and_limit() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let alice = user("alice");
        for date in ["2024-06-14", "2024-06-15", "2024-06-15"] {
            store
                .insert(&alice, Collection::Meals, object(json!({"date": date})))
                .await
                .unwrap();
        }

        let filter = FieldFilter::eq("date", "2024-06-15");
        let docs = store
            .list(&alice, Collection::Meals, Some(&filter), None)
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);

        let one = store.list(&alice, Collection::Meals, None, Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_field() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let filter = FieldFilter::eq("date') --", "x");
        let err = store
            .list(&user("alice"), Collection::Meals, Some(&filter), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let alice = user("alice");
        let id = store
            .insert(&alice, Collection::Weights, Map::new())
            .await
            .unwrap();
        store.delete(&alice, Collection::Weights, &id).await.unwrap();
        store.delete(&alice, Collection::Weights, &id).await.unwrap();
        assert!(store.get(&alice, Collection::Weights, &id).await.unwrap().is_none());
    }
}
