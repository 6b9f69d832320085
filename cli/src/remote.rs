use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use nosh_core::cloud::{Collection, Document, DocumentStore, FieldFilter, UserId};
use nosh_core::error::{StoreError, StoreResult};
use nosh_core::models::RecordId;

/// One document as listed by the server.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentEnvelope {
    pub id: String,
    pub body: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InsertResponse {
    pub id: String,
}

/// Error body sent by the server for every handled failure.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

/// Client for a `nosh serve` document server.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

/// Ids the server can never have issued. They are not sent at all because
/// `.` and `..` would be dropped or resolved as path segments.
fn is_addressable(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".."
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid server URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid server URL '{base_url}'");
        }
        let client = reqwest::Client::builder()
            .user_agent(format!("nosh/{} (meal logger)", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Each part is pushed as one percent-encoded segment, so an id can never
    /// reach outside `/v1/users/{user}/{collection}`.
    fn url(&self, user: &UserId, collection: Collection, id: Option<&str>) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StoreError::Remote(format!("{} is not a base URL", self.base_url)))?;
            segments
                .pop_if_empty()
                .extend(["v1", "users", user.as_str(), collection.as_str()]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn send(request: RequestBuilder) -> StoreResult<Response> {
    request
        .send()
        .await
        .map_err(|e| StoreError::Remote(format!("request failed: {e}")))
}

async fn ensure_success(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(%status, %body, "document server returned an error");
    Err(StoreError::Remote(format!("HTTP {status}")))
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> StoreResult<T> {
    resp.json()
        .await
        .map_err(|e| StoreError::Remote(format!("invalid response body: {e}")))
}

/// A 404 from a document handler carries an [`ErrorResponse`]. Anything else
/// means the URL did not reach a nosh server at all.
async fn ensure_document_missing(resp: Response) -> StoreResult<()> {
    let url = resp.url().clone();
    let body = resp.text().await.unwrap_or_default();
    if serde_json::from_str::<ErrorResponse>(&body).is_ok() {
        return Ok(());
    }
    tracing::warn!(%url, %body, "404 without a document error body");
    Err(StoreError::Remote(format!(
        "{url} is not a nosh document route; check the server URL"
    )))
}

fn not_found(collection: Collection, id: &str) -> StoreError {
    StoreError::NotFound {
        entity: collection.entity_name(),
        id: RecordId::from(id),
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn insert(
        &self,
        user: &UserId,
        collection: Collection,
        body: Map<String, Value>,
    ) -> StoreResult<String> {
        let url = self.url(user, collection, None)?;
        let resp = send(self.request(Method::POST, url).json(&body)).await?;
        let created: InsertResponse = decode(ensure_success(resp).await?).await?;
        Ok(created.id)
    }

    async fn get(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<Map<String, Value>>> {
        if !is_addressable(id) {
            return Ok(None);
        }
        let url = self.url(user, collection, Some(id))?;
        let resp = send(self.request(Method::GET, url)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            ensure_document_missing(resp).await?;
            return Ok(None);
        }
        Ok(Some(decode(ensure_success(resp).await?).await?))
    }

    async fn replace(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
        body: Map<String, Value>,
    ) -> StoreResult<()> {
        if !is_addressable(id) {
            return Err(not_found(collection, id));
        }
        let url = self.url(user, collection, Some(id))?;
        let resp = send(self.request(Method::PUT, url).json(&body)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            ensure_document_missing(resp).await?;
            return Err(not_found(collection, id));
        }
        ensure_success(resp).await?;
        Ok(())
    }

    async fn merge(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        if !is_addressable(id) {
            return Err(StoreError::InvalidQuery(format!("Invalid document id '{id}'")));
        }
        let url = self.url(user, collection, Some(id))?;
        let resp = send(self.request(Method::PATCH, url).json(&fields)).await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn delete(&self, user: &UserId, collection: Collection, id: &str) -> StoreResult<()> {
        if !is_addressable(id) {
            return Ok(());
        }
        let url = self.url(user, collection, Some(id))?;
        let resp = send(self.request(Method::DELETE, url)).await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn list(
        &self,
        user: &UserId,
        collection: Collection,
        filter: Option<&FieldFilter>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(f) = filter {
            params.push(("field", f.field.clone()));
            params.push(("value", f.value.clone()));
        }
        if let Some(n) = limit {
            params.push(("limit", n.to_string()));
        }

        let url = self.url(user, collection, None)?;
        let resp = send(self.request(Method::GET, url).query(&params)).await?;
        let docs: Vec<DocumentEnvelope> = decode(ensure_success(resp).await?).await?;
        Ok(docs.into_iter().map(|d| (d.id, d.body)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use nosh_core::cloud::{CloudStore, SqliteDocumentStore};
    use nosh_core::models::{
        Ingredient, MacroBreakdown, NewFavourite, NewMeal, NewRecipe, NewWeightEntry, SettingsPatch,
    };
    use nosh_core::store::EntityStore;

    use super::*;

    async fn spawn_server(api_key: Option<&str>) -> String {
        let docs = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        spawn_server_over(docs, api_key).await
    }

    async fn spawn_server_over(docs: Arc<SqliteDocumentStore>, api_key: Option<&str>) -> String {
        let app = crate::server::router(docs, api_key.map(str::to_string));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn cloud(base: &str, token: Option<&str>) -> CloudStore {
        cloud_for(base, token, "alice")
    }

    fn cloud_for(base: &str, token: Option<&str>, user: &str) -> CloudStore {
        let docs = HttpDocumentStore::new(base, token.map(str::to_string)).unwrap();
        CloudStore::new(Arc::new(docs), UserId::new(user).unwrap())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[tokio::test]
    async fn cloud_store_over_http() {
        let base = spawn_server(Some("k")).await;
        let store = cloud(&base, Some("k"));

        let meal = store
            .add_meal(&NewMeal::from_parsed(
                day(),
                "oats".to_string(),
                vec![MacroBreakdown {
                    food: "oats".to_string(),
                    calories: 300,
                    ..MacroBreakdown::default()
                }],
            ))
            .await
            .unwrap();

        let fetched = store.get_meal(&meal.id).await.unwrap().unwrap();
        assert_eq!(fetched, meal);
        assert_eq!(store.meals_for_date(day()).await.unwrap().len(), 1);
        assert!(store.has_meals().await.unwrap());

        store.delete_meal(&meal.id).await.unwrap();
        store.delete_meal(&meal.id).await.unwrap();
        assert!(store.get_meal(&meal.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_is_not_found_over_http() {
        let base = spawn_server(None).await;
        let store = cloud(&base, None);
        let ghost = NewMeal::from_parsed(day(), "ghost".to_string(), vec![])
            .into_meal(RecordId::from("missing"));

        let err = store.update_meal(&ghost).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn settings_merge_over_http() {
        let base = spawn_server(None).await;
        let store = cloud(&base, None);
        store
            .update_settings(&SettingsPatch {
                fat_goal: Some(55),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        let settings = store
            .update_settings(&SettingsPatch {
                spoon_g: Some(10),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(settings.fat_goal, 55);
        assert_eq!(settings.spoon_g, 10);
    }

    #[tokio::test]
    async fn wrong_token_is_remote_error() {
        let base = spawn_server(Some("right")).await;
        let store = cloud(&base, Some("wrong"));
        let err = store.all_meals().await.unwrap_err();
        assert!(matches!(err, StoreError::Remote(_)));
    }

    #[test]
    fn url_encodes_every_segment() {
        let store = HttpDocumentStore::new("http://localhost:8080/", None).unwrap();
        let alice = UserId::new("alice").unwrap();
        let url = store
            .url(&alice, Collection::Weights, Some("../../bob/meals/x"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/users/alice/weights/..%2F..%2Fbob%2Fmeals%2Fx"
        );

        let prefixed = HttpDocumentStore::new("http://localhost/nosh", None).unwrap();
        let url = prefixed.url(&alice, Collection::Meals, None).unwrap();
        assert_eq!(url.as_str(), "http://localhost/nosh/v1/users/alice/meals");
    }

    #[test]
    fn rejects_unusable_server_urls() {
        assert!(HttpDocumentStore::new("not a url", None).is_err());
        assert!(HttpDocumentStore::new("mailto:me@example.com", None).is_err());
    }

    #[tokio::test]
    async fn record_ids_stay_inside_the_signed_in_namespace() {
        let docs = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let base = spawn_server_over(docs.clone(), Some("k")).await;
        let bob = cloud_for(&base, Some("k"), "bob");
        let alice = cloud_for(&base, Some("k"), "alice");

        let meal = bob
            .add_meal(&NewMeal::from_parsed(day(), "toast".to_string(), vec![]))
            .await
            .unwrap();
        let escape = RecordId::from(format!("../../bob/meals/{}", meal.id));

        alice.delete_weight(&escape).await.unwrap();
        alice.delete_meal(&RecordId::from("..")).await.unwrap();
        assert!(alice.get_meal(&escape).await.unwrap().is_none());
        assert!(alice.get_meal(&RecordId::from(".")).await.unwrap().is_none());

        let ghost = NewMeal::from_parsed(day(), "hijack".to_string(), vec![]).into_meal(escape);
        assert!(alice.update_meal(&ghost).await.unwrap_err().is_not_found());

        let bobs = docs
            .list(&UserId::new("bob").unwrap(), Collection::Meals, None, None)
            .await
            .unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bob.get_meal(&meal.id).await.unwrap().unwrap().content, "toast");
    }

    #[tokio::test]
    async fn wrong_base_path_is_an_error_not_a_missing_record() {
        let base = spawn_server(None).await;
        let store = cloud(&format!("{base}/not-nosh"), None);

        let err = store.get_meal(&RecordId::from("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::Remote(_)));
        let err = store.get_settings().await.unwrap_err();
        assert!(matches!(err, StoreError::Remote(_)));
    }

    #[tokio::test]
    async fn missing_records_use_singular_names_over_http() {
        let base = spawn_server(None).await;
        let store = cloud(&base, None);
        let ghost = NewMeal::from_parsed(day(), "ghost".to_string(), vec![])
            .into_meal(RecordId::from("missing"));
        let err = store.update_meal(&ghost).await.unwrap_err();
        assert_eq!(err.to_string(), "No meal with id missing");
    }

    #[tokio::test]
    async fn updates_replace_or_fail_when_absent_over_http() {
        let base = spawn_server(None).await;
        let store = cloud(&base, None);

        let source = NewMeal::from_parsed(day(), "oats".to_string(), vec![])
            .into_meal(RecordId::from("m"));
        let mut fav = store
            .add_favourite(&NewFavourite::from_meal("breakfast".to_string(), &source))
            .await
            .unwrap();
        fav.name = "brunch".to_string();
        store.update_favourite(&fav).await.unwrap();
        assert!(store.favourite_by_name("brunch").await.unwrap().is_some());
        fav.id = RecordId::from("missing");
        assert!(store.update_favourite(&fav).await.unwrap_err().is_not_found());

        let mut entry = store
            .add_weight(&NewWeightEntry {
                date: day(),
                weight_kg: 80.0,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        entry.weight_kg = 79.5;
        store.update_weight(&entry).await.unwrap();
        assert!((store.all_weights().await.unwrap()[0].weight_kg - 79.5).abs() < f64::EPSILON);
        entry.id = RecordId::from("missing");
        let err = store.update_weight(&entry).await.unwrap_err();
        assert_eq!(err.to_string(), "No weight entry with id missing");

        let mut recipe = store
            .add_recipe(&NewRecipe::from_ingredients(
                "Dal".to_string(),
                vec![Ingredient {
                    name: "lentils".to_string(),
                    weight_g: 250.0,
                    calories: 290.0,
                    ..Ingredient::default()
                }],
            ))
            .await
            .unwrap();
        recipe.name = "Tarka dal".to_string();
        store.update_recipe(&recipe).await.unwrap();
        assert!(store.recipe_by_name("Tarka dal").await.unwrap().is_some());
        recipe.id = RecordId::from("missing");
        assert!(store.update_recipe(&recipe).await.unwrap_err().is_not_found());
    }
}
