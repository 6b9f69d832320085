use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreResult;
use crate::models::{
    Favourite, Meal, NewFavourite, NewMeal, NewRecipe, NewWeightEntry, Recipe, RecordId,
    SettingsPatch, UserSettings, WeightEntry,
};

/// The CRUD surface shared by the local and cloud backends.
///
/// Both backends honour the same contract:
/// - `add_*` assigns a fresh key and returns the stored record.
/// - `update_*` replaces the whole record and fails with `NotFound` when the key is absent.
/// - `delete_*` is idempotent.
/// - list results carry no ordering guarantee; sort before display.
///
/// Unique names (favourites, recipes) are only enforced by the local backend.
/// Callers that need the guarantee on every backend check `*_by_name` first.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // --- Meals ---
    async fn add_meal(&self, meal: &NewMeal) -> StoreResult<Meal>;
    async fn get_meal(&self, id: &RecordId) -> StoreResult<Option<Meal>>;
    async fn meals_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Meal>>;
    async fn all_meals(&self) -> StoreResult<Vec<Meal>>;
    async fn update_meal(&self, meal: &Meal) -> StoreResult<()>;
    async fn delete_meal(&self, id: &RecordId) -> StoreResult<()>;

    // --- Favourites ---
    async fn add_favourite(&self, favourite: &NewFavourite) -> StoreResult<Favourite>;
    async fn favourite_by_name(&self, name: &str) -> StoreResult<Option<Favourite>>;
    async fn all_favourites(&self) -> StoreResult<Vec<Favourite>>;
    async fn update_favourite(&self, favourite: &Favourite) -> StoreResult<()>;
    async fn delete_favourite(&self, id: &RecordId) -> StoreResult<()>;

    // --- Weight ---
    async fn add_weight(&self, entry: &NewWeightEntry) -> StoreResult<WeightEntry>;
    async fn weights_for_date(&self, date: NaiveDate) -> StoreResult<Vec<WeightEntry>>;
    async fn all_weights(&self) -> StoreResult<Vec<WeightEntry>>;
    async fn update_weight(&self, entry: &WeightEntry) -> StoreResult<()>;
    async fn delete_weight(&self, id: &RecordId) -> StoreResult<()>;

    // --- Recipes ---
    async fn add_recipe(&self, recipe: &NewRecipe) -> StoreResult<Recipe>;
    async fn recipe_by_name(&self, name: &str) -> StoreResult<Option<Recipe>>;
    async fn all_recipes(&self) -> StoreResult<Vec<Recipe>>;
    async fn update_recipe(&self, recipe: &Recipe) -> StoreResult<()>;
    async fn delete_recipe(&self, id: &RecordId) -> StoreResult<()>;

    // --- Settings ---
    async fn get_settings(&self) -> StoreResult<UserSettings>;
    /// Merge the patch into the stored settings and return the result.
    async fn update_settings(&self, patch: &SettingsPatch) -> StoreResult<UserSettings>;
}
