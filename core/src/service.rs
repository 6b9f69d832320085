use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};

use crate::error::StoreError;
use crate::intent::{Intent, IntentError, parse_ingredients, parse_intent};
use crate::models::{
    DailySummary, DailyTotals, EXPORT_VERSION, ExportData, Favourite, Ingredient, MacroTotals,
    Meal, NewFavourite, NewMeal, NewRecipe, NewWeightEntry, Recipe, RecordId, SettingsPatch,
    UserSettings, WeightEntry, validate_name, validate_portion_grams, validate_weight_kg,
};
use crate::prompt::{
    PromptContext, ingredients_prompt, intent_prompt, suggestion_prompt, weekly_prompt,
};
use crate::session::Session;
use crate::store::EntityStore;

/// Days with logged meals needed before advice is offered.
pub const MIN_HISTORY_DAYS: usize = 3;
/// Days of history, ending today, that advice looks at.
pub const HISTORY_WINDOW_DAYS: u64 = 7;

pub const MISSING_KEY_MESSAGE: &str =
    "No API key configured. Set one with `nosh settings set --api-key …`.";
pub const SERVICE_DOWN_MESSAGE: &str = "The assistant is unavailable right now. Please try again.";
pub const NOT_UNDERSTOOD_MESSAGE: &str = "Sorry, I couldn't understand that.";

/// Text completion backend.
///
/// The CLI implements this with reqwest against Gemini; tests use a scripted
/// provider. Transport failures and non-success responses come back as
/// [`IntentError::Service`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<String, IntentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No favourite named '{0}'.")]
    UnknownFavourite(String),

    #[error("No recipe named '{0}'.")]
    UnknownRecipe(String),

    #[error("There is no meal logged today to save.")]
    NothingToSave,

    #[error("{0}")]
    Invalid(String),
}

impl ServiceError {
    /// The text shown to the user for this failure.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Intent(IntentError::MissingApiKey) => MISSING_KEY_MESSAGE.to_string(),
            Self::Intent(IntentError::Service(_)) => SERVICE_DOWN_MESSAGE.to_string(),
            Self::Intent(IntentError::Malformed(_)) => NOT_UNDERSTOOD_MESSAGE.to_string(),
            Self::Store(StoreError::Duplicate { entity, name }) => {
                format!("A {entity} named '{name}' already exists.")
            }
            Self::Store(e) if e.is_not_found() => format!("{e}."),
            Self::Store(_) => "Something went wrong saving your data. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

fn invalid(e: anyhow::Error) -> ServiceError {
    ServiceError::Invalid(e.to_string())
}

/// Outcome of one chat message.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    MealLogged(Meal),
    FavouriteSaved(Favourite),
    FavouriteLogged { name: String, meal: Meal },
    WeightLogged(WeightEntry),
    HeightSet(f64),
    AgeSet(i64),
    RecipeLogged { name: String, meal: Meal },
    Chat(String),
    Error(String),
}

impl Reply {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Reply::MealLogged(meal) | Reply::RecipeLogged { meal, .. } => {
                let label = meal
                    .parsed
                    .first()
                    .map(|p| p.food.as_str())
                    .filter(|f| !f.is_empty())
                    .unwrap_or(&meal.content);
                format!("Logged {label}: {} kcal.", meal.total_calories)
            }
            Reply::FavouriteSaved(fav) => format!(
                "Saved '{}' as a favourite ({} kcal).",
                fav.name, fav.total_calories
            ),
            Reply::FavouriteLogged { name, meal } => {
                format!("Logged favourite '{name}': {} kcal.", meal.total_calories)
            }
            Reply::WeightLogged(entry) => format!("Logged weight: {:.1} kg.", entry.weight_kg),
            Reply::HeightSet(cm) => format!("Height set to {cm:.0} cm."),
            Reply::AgeSet(years) => format!("Age set to {years}."),
            Reply::Chat(text) | Reply::Error(text) => text.clone(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// Application operations on top of the session's store.
pub struct NoshService {
    session: Session,
}

impl NoshService {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn store(&self) -> &dyn EntityStore {
        self.session.store()
    }

    async fn api_key(&self) -> Result<String, ServiceError> {
        let settings = self.store().get_settings().await?;
        settings
            .api_key()
            .map(str::to_string)
            .ok_or(ServiceError::Intent(IntentError::MissingApiKey))
    }

    // --- Chat ---

    /// Interpret one free-text message and apply it. Never fails: errors come
    /// back as [`Reply::Error`].
    pub async fn handle_message(
        &self,
        provider: &dyn CompletionProvider,
        text: &str,
        today: NaiveDate,
    ) -> Reply {
        match self.try_handle_message(provider, text, today).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat message failed");
                Reply::Error(e.user_message())
            }
        }
    }

    async fn try_handle_message(
        &self,
        provider: &dyn CompletionProvider,
        text: &str,
        today: NaiveDate,
    ) -> Result<Reply, ServiceError> {
        let settings = self.store().get_settings().await?;
        let api_key = settings.api_key().ok_or(IntentError::MissingApiKey)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Invalid("Message is empty.".to_string()));
        }

        let meals = self.meals_for_date(today).await?;
        let recipe_names: Vec<String> = self
            .recipes()
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        let ctx = PromptContext {
            today,
            meals: &meals,
            recipe_names: &recipe_names,
            settings: &settings,
        };

        let raw = provider.complete(api_key, &intent_prompt(text, &ctx)).await?;
        let intent = parse_intent(&raw)?;
        tracing::debug!(?intent, "parsed intent");
        self.apply_intent(intent, text, today).await
    }

    async fn apply_intent(
        &self,
        intent: Intent,
        text: &str,
        today: NaiveDate,
    ) -> Result<Reply, ServiceError> {
        match intent {
            Intent::Meal(mut item) => {
                if item.food.is_empty() {
                    item.food = text.to_string();
                }
                let new = NewMeal::from_parsed(today, text.to_string(), vec![item]);
                Ok(Reply::MealLogged(self.store().add_meal(&new).await?))
            }
            Intent::SaveFavourite { name } => {
                Ok(Reply::FavouriteSaved(self.save_favourite(&name, today).await?))
            }
            Intent::LogFavourite { name } => {
                let meal = self.log_favourite(&name, today).await?;
                Ok(Reply::FavouriteLogged { name, meal })
            }
            Intent::Weight { kg } => Ok(Reply::WeightLogged(self.log_weight(kg, today).await?)),
            Intent::Height { cm } => {
                self.set_height(cm).await?;
                Ok(Reply::HeightSet(cm))
            }
            Intent::Age { years } => {
                self.set_age(years).await?;
                Ok(Reply::AgeSet(years))
            }
            Intent::Recipe { name, grams } => {
                let meal = self.log_recipe(&name, grams, today).await?;
                Ok(Reply::RecipeLogged { name, meal })
            }
            Intent::Chat { message } if message.is_empty() => {
                Ok(Reply::Chat(NOT_UNDERSTOOD_MESSAGE.to_string()))
            }
            Intent::Chat { message } => Ok(Reply::Chat(message)),
        }
    }

    // --- Meals ---

    /// Meals for one day, newest first.
    pub async fn meals_for_date(&self, date: NaiveDate) -> Result<Vec<Meal>, ServiceError> {
        let mut meals = self.store().meals_for_date(date).await?;
        meals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(meals)
    }

    /// Every meal, newest first.
    pub async fn all_meals(&self) -> Result<Vec<Meal>, ServiceError> {
        let mut meals = self.store().all_meals().await?;
        meals.sort_by(|a, b| b.date.cmp(&a.date).then(b.timestamp.cmp(&a.timestamp)));
        Ok(meals)
    }

    pub async fn get_meal(&self, id: &RecordId) -> Result<Option<Meal>, ServiceError> {
        Ok(self.store().get_meal(id).await?)
    }

    pub async fn update_meal(&self, meal: &Meal) -> Result<(), ServiceError> {
        Ok(self.store().update_meal(meal).await?)
    }

    pub async fn delete_meal(&self, id: &RecordId) -> Result<(), ServiceError> {
        Ok(self.store().delete_meal(id).await?)
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary, ServiceError> {
        let meals = self.meals_for_date(date).await?;
        let settings = self.store().get_settings().await?;
        Ok(DailySummary {
            date,
            totals: MacroTotals::of_meals(&meals),
            meals,
            calorie_goal: settings.calorie_goal,
            protein_goal: settings.protein_goal,
            carbs_goal: settings.carbs_goal,
            fat_goal: settings.fat_goal,
        })
    }

    /// Per-day totals for the `days` days ending at `end`, oldest first.
    /// Days without meals are omitted.
    pub async fn daily_totals(
        &self,
        end: NaiveDate,
        days: u64,
    ) -> Result<Vec<DailyTotals>, ServiceError> {
        let start = end
            .checked_sub_days(Days::new(days.saturating_sub(1)))
            .unwrap_or(NaiveDate::MIN);

        let mut by_day: BTreeMap<NaiveDate, Vec<Meal>> = BTreeMap::new();
        for meal in self.store().all_meals().await? {
            if meal.date >= start && meal.date <= end {
                by_day.entry(meal.date).or_default().push(meal);
            }
        }

        Ok(by_day
            .into_iter()
            .map(|(date, meals)| DailyTotals {
                date,
                totals: MacroTotals::of_meals(&meals),
                meal_count: meals.len(),
            })
            .collect())
    }

    pub async fn export_meals(&self) -> Result<ExportData, ServiceError> {
        let mut meals = self.store().all_meals().await?;
        meals.sort_by(|a, b| a.date.cmp(&b.date).then(a.timestamp.cmp(&b.timestamp)));
        Ok(ExportData {
            version: EXPORT_VERSION,
            exported_at: Utc::now().to_rfc3339(),
            meals,
        })
    }

    // --- Favourites ---

    async fn ensure_favourite_name_free(&self, name: &str) -> Result<(), ServiceError> {
        if self.store().favourite_by_name(name).await?.is_some() {
            return Err(StoreError::Duplicate {
                entity: "favourite",
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn insert_favourite(&self, name: &str, meal: &Meal) -> Result<Favourite, ServiceError> {
        let name = validate_name(name).map_err(invalid)?;
        self.ensure_favourite_name_free(&name).await?;
        Ok(self
            .store()
            .add_favourite(&NewFavourite::from_meal(name, meal))
            .await?)
    }

    /// Save the most recent meal of `today` under `name`.
    pub async fn save_favourite(
        &self,
        name: &str,
        today: NaiveDate,
    ) -> Result<Favourite, ServiceError> {
        let latest = self
            .meals_for_date(today)
            .await?
            .into_iter()
            .next()
            .ok_or(ServiceError::NothingToSave)?;
        self.insert_favourite(name, &latest).await
    }

    pub async fn save_meal_as_favourite(
        &self,
        name: &str,
        meal_id: &RecordId,
    ) -> Result<Favourite, ServiceError> {
        let meal = self.store().get_meal(meal_id).await?.ok_or_else(|| {
            ServiceError::Store(StoreError::NotFound {
                entity: "meal",
                id: meal_id.clone(),
            })
        })?;
        self.insert_favourite(name, &meal).await
    }

    /// Log a copy of a favourite's snapshot as a new meal.
    pub async fn log_favourite(&self, name: &str, today: NaiveDate) -> Result<Meal, ServiceError> {
        let name = name.trim();
        let fav = self
            .store()
            .favourite_by_name(name)
            .await?
            .ok_or_else(|| ServiceError::UnknownFavourite(name.to_string()))?;
        let meal = NewMeal {
            date: today,
            timestamp: Utc::now(),
            content: fav.content,
            parsed: fav.parsed,
            total_calories: fav.total_calories,
        };
        Ok(self.store().add_meal(&meal).await?)
    }

    /// Favourites sorted by name.
    pub async fn favourites(&self) -> Result<Vec<Favourite>, ServiceError> {
        let mut favs = self.store().all_favourites().await?;
        favs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(favs)
    }

    /// Returns false when no favourite had that name.
    pub async fn delete_favourite(&self, name: &str) -> Result<bool, ServiceError> {
        match self.store().favourite_by_name(name.trim()).await? {
            Some(fav) => {
                self.store().delete_favourite(&fav.id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Weight and profile ---

    /// Record a weigh-in and keep the profile weight in step.
    pub async fn log_weight(&self, kg: f64, date: NaiveDate) -> Result<WeightEntry, ServiceError> {
        validate_weight_kg(kg).map_err(invalid)?;
        let entry = self
            .store()
            .add_weight(&NewWeightEntry {
                date,
                weight_kg: kg,
                timestamp: Utc::now(),
            })
            .await?;
        self.store()
            .update_settings(&SettingsPatch {
                weight_kg: Some(kg),
                ..SettingsPatch::default()
            })
            .await?;
        Ok(entry)
    }

    /// Weigh-ins, newest first.
    pub async fn weights(&self) -> Result<Vec<WeightEntry>, ServiceError> {
        let mut entries = self.store().all_weights().await?;
        entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.timestamp.cmp(&a.timestamp)));
        Ok(entries)
    }

    pub async fn weights_for_date(&self, date: NaiveDate) -> Result<Vec<WeightEntry>, ServiceError> {
        Ok(self.store().weights_for_date(date).await?)
    }

    pub async fn delete_weight(&self, id: &RecordId) -> Result<(), ServiceError> {
        Ok(self.store().delete_weight(id).await?)
    }

    pub async fn set_height(&self, cm: f64) -> Result<UserSettings, ServiceError> {
        if !cm.is_finite() || cm <= 0.0 || cm >= 300.0 {
            return Err(ServiceError::Invalid(
                "Height must be between 0 and 300 cm.".to_string(),
            ));
        }
        self.update_settings(&SettingsPatch {
            height_cm: Some(cm),
            ..SettingsPatch::default()
        })
        .await
    }

    pub async fn set_age(&self, years: i64) -> Result<UserSettings, ServiceError> {
        if !(1..=150).contains(&years) {
            return Err(ServiceError::Invalid(
                "Age must be between 1 and 150.".to_string(),
            ));
        }
        self.update_settings(&SettingsPatch {
            age: Some(years),
            ..SettingsPatch::default()
        })
        .await
    }

    // --- Recipes ---

    async fn ensure_recipe_name_free(&self, name: &str) -> Result<(), ServiceError> {
        if self.store().recipe_by_name(name).await?.is_some() {
            return Err(StoreError::Duplicate {
                entity: "recipe",
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Store a recipe from an already structured ingredient list.
    pub async fn save_recipe(
        &self,
        name: &str,
        ingredients: Vec<Ingredient>,
    ) -> Result<Recipe, ServiceError> {
        let name = validate_name(name).map_err(invalid)?;
        if ingredients.is_empty() {
            return Err(ServiceError::Invalid(
                "A recipe needs at least one ingredient.".to_string(),
            ));
        }
        self.ensure_recipe_name_free(&name).await?;
        Ok(self
            .store()
            .add_recipe(&NewRecipe::from_ingredients(name, ingredients))
            .await?)
    }

    /// Have the assistant structure a free-text ingredient list, then store
    /// the recipe.
    pub async fn create_recipe(
        &self,
        provider: &dyn CompletionProvider,
        name: &str,
        ingredients_text: &str,
    ) -> Result<Recipe, ServiceError> {
        let name = validate_name(name).map_err(invalid)?;
        self.ensure_recipe_name_free(&name).await?;
        let api_key = self.api_key().await?;

        let raw = provider
            .complete(&api_key, &ingredients_prompt(ingredients_text))
            .await?;
        let ingredients = parse_ingredients(&raw)
            .filter(|items| !items.is_empty())
            .ok_or_else(|| IntentError::Malformed("unreadable ingredient list".to_string()))?;

        self.save_recipe(&name, ingredients).await
    }

    pub async fn recipe(&self, name: &str) -> Result<Recipe, ServiceError> {
        let name = name.trim();
        self.store()
            .recipe_by_name(name)
            .await?
            .ok_or_else(|| ServiceError::UnknownRecipe(name.to_string()))
    }

    /// Recipes sorted by name.
    pub async fn recipes(&self) -> Result<Vec<Recipe>, ServiceError> {
        let mut recipes = self.store().all_recipes().await?;
        recipes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(recipes)
    }

    /// Log `grams` of a recipe, scaled linearly from its stored totals.
    pub async fn log_recipe(
        &self,
        name: &str,
        grams: f64,
        date: NaiveDate,
    ) -> Result<Meal, ServiceError> {
        validate_portion_grams(grams).map_err(invalid)?;
        let recipe = self.recipe(name).await?;
        let portion = recipe.portion(grams).ok_or_else(|| {
            ServiceError::Invalid(format!("Recipe '{}' has no recorded weight.", recipe.name))
        })?;
        let meal = NewMeal::from_parsed(
            date,
            format!("{grams:.0}g of {}", recipe.name),
            vec![portion],
        );
        Ok(self.store().add_meal(&meal).await?)
    }

    /// Returns false when no recipe had that name.
    pub async fn delete_recipe(&self, name: &str) -> Result<bool, ServiceError> {
        match self.store().recipe_by_name(name.trim()).await? {
            Some(recipe) => {
                self.store().delete_recipe(&recipe.id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Settings ---

    pub async fn settings(&self) -> Result<UserSettings, ServiceError> {
        Ok(self.store().get_settings().await?)
    }

    pub async fn update_settings(
        &self,
        patch: &SettingsPatch,
    ) -> Result<UserSettings, ServiceError> {
        Ok(self.store().update_settings(patch).await?)
    }

    // --- Advice ---

    /// One meal idea based on the past week. `None` without a key or enough
    /// history.
    pub async fn suggest_meal(
        &self,
        provider: &dyn CompletionProvider,
        today: NaiveDate,
    ) -> Result<Option<String>, ServiceError> {
        self.advice(provider, today, suggestion_prompt).await
    }

    /// A short note on the past week. `None` without a key or enough history.
    pub async fn weekly_observation(
        &self,
        provider: &dyn CompletionProvider,
        today: NaiveDate,
    ) -> Result<Option<String>, ServiceError> {
        self.advice(provider, today, weekly_prompt).await
    }

    async fn advice(
        &self,
        provider: &dyn CompletionProvider,
        today: NaiveDate,
        build: fn(&[DailyTotals], &UserSettings) -> String,
    ) -> Result<Option<String>, ServiceError> {
        let settings = self.store().get_settings().await?;
        let Some(api_key) = settings.api_key() else {
            return Ok(None);
        };

        let history = self.daily_totals(today, HISTORY_WINDOW_DAYS).await?;
        if history.len() < MIN_HISTORY_DAYS {
            tracing::debug!(days = history.len(), "not enough history for advice");
            return Ok(None);
        }

        let text = provider.complete(api_key, &build(&history, &settings)).await?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}
