use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{Collection, Document, DocumentStore, FieldFilter, UserId};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Favourite, Meal, NewFavourite, NewMeal, NewRecipe, NewWeightEntry, Recipe, RecordId,
    SettingsPatch, UserSettings, WeightEntry,
};
use crate::store::EntityStore;

/// Settings are a single document per user.
pub const SETTINGS_DOC_ID: &str = "profile";

/// Entity CRUD against a document store, scoped to one user.
///
/// Record ids are the document ids; they are never written into the body.
/// Name uniqueness is not enforced here.
pub struct CloudStore {
    docs: Arc<dyn DocumentStore>,
    user: UserId,
}

impl CloudStore {
    pub fn new(docs: Arc<dyn DocumentStore>, user: UserId) -> Self {
        Self { docs, user }
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Whether this account already holds at least one meal.
    pub async fn has_meals(&self) -> StoreResult<bool> {
        let docs = self
            .docs
            .list(&self.user, Collection::Meals, None, Some(1))
            .await?;
        Ok(!docs.is_empty())
    }

    async fn insert<T: Serialize + Sync>(
        &self,
        collection: Collection,
        record: &T,
    ) -> StoreResult<RecordId> {
        let body = to_body(record)?;
        let id = self.docs.insert(&self.user, collection, body).await?;
        Ok(RecordId::new(id))
    }

    async fn find<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> StoreResult<Option<T>> {
        self.docs
            .get(&self.user, collection, id.as_str())
            .await?
            .map(|body| from_document((id.to_string(), body)))
            .transpose()
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: Option<&FieldFilter>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<T>> {
        self.docs
            .list(&self.user, collection, filter, limit)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    async fn first_named<T: DeserializeOwned>(
        &self,
        collection: Collection,
        name: &str,
    ) -> StoreResult<Option<T>> {
        let filter = FieldFilter::eq("name", name);
        Ok(self
            .list(collection, Some(&filter), Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn replace<T: Serialize + Sync>(
        &self,
        collection: Collection,
        id: &RecordId,
        record: &T,
    ) -> StoreResult<()> {
        let body = to_body(record)?;
        self.docs
            .replace(&self.user, collection, id.as_str(), body)
            .await
    }

    async fn remove(&self, collection: Collection, id: &RecordId) -> StoreResult<()> {
        self.docs.delete(&self.user, collection, id.as_str()).await
    }
}

fn to_body<T: Serialize>(record: &T) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        _ => Err(StoreError::Remote("record did not serialize to an object".to_string())),
    }
}

fn from_document<T: DeserializeOwned>((id, mut body): Document) -> StoreResult<T> {
    body.insert("id".to_string(), Value::String(id));
    Ok(serde_json::from_value(Value::Object(body))?)
}

fn date_filter(date: NaiveDate) -> FieldFilter {
    FieldFilter::eq("date", date.format("%Y-%m-%d").to_string())
}

#[async_trait]
impl EntityStore for CloudStore {
    // --- Meals ---

    async fn add_meal(&self, meal: &NewMeal) -> StoreResult<Meal> {
        let id = self.insert(Collection::Meals, meal).await?;
        Ok(meal.clone().into_meal(id))
    }

    async fn get_meal(&self, id: &RecordId) -> StoreResult<Option<Meal>> {
        self.find(Collection::Meals, id).await
    }

    async fn meals_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Meal>> {
        self.list(Collection::Meals, Some(&date_filter(date)), None)
            .await
    }

    async fn all_meals(&self) -> StoreResult<Vec<Meal>> {
        self.list(Collection::Meals, None, None).await
    }

    async fn update_meal(&self, meal: &Meal) -> StoreResult<()> {
        self.replace(Collection::Meals, &meal.id, meal).await
    }

    async fn delete_meal(&self, id: &RecordId) -> StoreResult<()> {
        self.remove(Collection::Meals, id).await
    }

    // --- Favourites ---

    async fn add_favourite(&self, favourite: &NewFavourite) -> StoreResult<Favourite> {
        let id = self.insert(Collection::Favourites, favourite).await?;
        Ok(favourite.clone().into_favourite(id))
    }

    async fn favourite_by_name(&self, name: &str) -> StoreResult<Option<Favourite>> {
        self.first_named(Collection::Favourites, name).await
    }

    async fn all_favourites(&self) -> StoreResult<Vec<Favourite>> {
        self.list(Collection::Favourites, None, None).await
    }

    async fn update_favourite(&self, favourite: &Favourite) -> StoreResult<()> {
        self.replace(Collection::Favourites, &favourite.id, favourite)
            .await
    }

    async fn delete_favourite(&self, id: &RecordId) -> StoreResult<()> {
        self.remove(Collection::Favourites, id).await
    }

    // --- Weight ---

    async fn add_weight(&self, entry: &NewWeightEntry) -> StoreResult<WeightEntry> {
        let id = self.insert(Collection::Weights, entry).await?;
        Ok(entry.clone().into_entry(id))
    }

    async fn weights_for_date(&self, date: NaiveDate) -> StoreResult<Vec<WeightEntry>> {
        self.list(Collection::Weights, Some(&date_filter(date)), None)
            .await
    }

    async fn all_weights(&self) -> StoreResult<Vec<WeightEntry>> {
        self.list(Collection::Weights, None, None).await
    }

    async fn update_weight(&self, entry: &WeightEntry) -> StoreResult<()> {
        self.replace(Collection::Weights, &entry.id, entry).await
    }

    async fn delete_weight(&self, id: &RecordId) -> StoreResult<()> {
        self.remove(Collection::Weights, id).await
    }

    // --- Recipes ---

    async fn add_recipe(&self, recipe: &NewRecipe) -> StoreResult<Recipe> {
        let id = self.insert(Collection::Recipes, recipe).await?;
        Ok(recipe.clone().into_recipe(id))
    }

    async fn recipe_by_name(&self, name: &str) -> StoreResult<Option<Recipe>> {
        self.first_named(Collection::Recipes, name).await
    }

    async fn all_recipes(&self) -> StoreResult<Vec<Recipe>> {
        self.list(Collection::Recipes, None, None).await
    }

    async fn update_recipe(&self, recipe: &Recipe) -> StoreResult<()> {
        self.replace(Collection::Recipes, &recipe.id, recipe).await
    }

    async fn delete_recipe(&self, id: &RecordId) -> StoreResult<()> {
        self.remove(Collection::Recipes, id).await
    }

    // --- Settings ---

    async fn get_settings(&self) -> StoreResult<UserSettings> {
        let stored = self
            .docs
            .get(&self.user, Collection::Settings, SETTINGS_DOC_ID)
            .await?;
        let patch: SettingsPatch = match stored {
            Some(body) => serde_json::from_value(Value::Object(body))?,
            None => SettingsPatch::default(),
        };
        Ok(UserSettings::from_patch(&patch))
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> StoreResult<UserSettings> {
        if !patch.is_empty() {
            self.docs
                .merge(
                    &self.user,
                    Collection::Settings,
                    SETTINGS_DOC_ID,
                    patch.to_fields()?,
                )
                .await?;
        }
        self.get_settings().await
    }
}
