//! The remote side of storage.
//!
//! A [`DocumentStore`] holds JSON documents addressed by user, collection and
//! id. [`CloudStore`] layers the entity CRUD contract on top of one, pinned to
//! a single user's namespace.

mod sqlite;
mod store;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreResult;

pub use sqlite::SqliteDocumentStore;
pub use store::CloudStore;

/// Identifier of a signed-in account. Every cloud document lives under one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> anyhow::Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 128
            && id != "."
            && id != ".."
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if !valid {
            anyhow::bail!(
                "Invalid user id '{id}'. Use letters, digits, '-', '_', '.', or '@' (max 128)"
            );
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The collections that make up one user's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Meals,
    Favourites,
    Weights,
    Recipes,
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Meals,
        Collection::Favourites,
        Collection::Weights,
        Collection::Recipes,
        Collection::Settings,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Meals => "meals",
            Collection::Favourites => "favourites",
            Collection::Weights => "weights",
            Collection::Recipes => "recipes",
            Collection::Settings => "settings",
        }
    }

    /// Singular name of one record, as used in error messages.
    #[must_use]
    pub fn entity_name(self) -> &'static str {
        match self {
            Collection::Meals => "meal",
            Collection::Favourites => "favourite",
            Collection::Weights => "weight entry",
            Collection::Recipes => "recipe",
            Collection::Settings => "settings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown collection '{s}'"))
    }
}

/// Equality filter on a top-level string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    pub fn eq(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Field names are restricted so they can be embedded in a JSON path.
    #[must_use]
    pub fn is_valid_field(field: &str) -> bool {
        !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

/// A stored document: its id and JSON body.
pub type Document = (String, Map<String, Value>);

/// The remote document database primitive.
///
/// - `insert` generates the id.
/// - `replace` fails with `NotFound` when the document is absent.
/// - `merge` overlays top-level fields and creates the document if needed.
/// - `delete` is idempotent.
/// - `list` order is unspecified.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(
        &self,
        user: &UserId,
        collection: Collection,
        body: Map<String, Value>,
    ) -> StoreResult<String>;

    async fn get(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<Map<String, Value>>>;

    async fn replace(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
        body: Map<String, Value>,
    ) -> StoreResult<()>;

    async fn merge(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()>;

    async fn delete(&self, user: &UserId, collection: Collection, id: &str) -> StoreResult<()>;

    async fn list(
        &self,
        user: &UserId,
        collection: Collection,
        filter: Option<&FieldFilter>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>>;
}
