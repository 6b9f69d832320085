use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Opaque record key.
///
/// The local store renders its SQLite rowid as a decimal string; the cloud
/// store hands out UUIDs. Callers never interpret the contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The rowid this key refers to in the local store, if it is one.
    #[must_use]
    pub fn as_rowid(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Meals ---

/// One parsed food line with its macros, as returned by the assistant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroBreakdown {
    pub food: String,
    pub calories: i64,
    pub protein: i64,
    pub fat: i64,
    pub carbs: i64,
    pub fiber: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    #[serde(default)]
    pub id: RecordId,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub parsed: Vec<MacroBreakdown>,
    pub total_calories: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeal {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub parsed: Vec<MacroBreakdown>,
    pub total_calories: i64,
}

impl NewMeal {
    /// Build a meal whose total is the sum of its parsed entries.
    #[must_use]
    pub fn from_parsed(date: NaiveDate, content: String, parsed: Vec<MacroBreakdown>) -> Self {
        let total_calories = parsed.iter().map(|p| p.calories).sum();
        Self {
            date,
            timestamp: Utc::now(),
            content,
            parsed,
            total_calories,
        }
    }

    #[must_use]
    pub fn into_meal(self, id: RecordId) -> Meal {
        Meal {
            id,
            date: self.date,
            timestamp: self.timestamp,
            content: self.content,
            parsed: self.parsed,
            total_calories: self.total_calories,
        }
    }
}

// --- Favourites ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favourite {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    pub content: String,
    pub parsed: Vec<MacroBreakdown>,
    pub total_calories: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFavourite {
    pub name: String,
    pub content: String,
    pub parsed: Vec<MacroBreakdown>,
    pub total_calories: i64,
    pub created_at: DateTime<Utc>,
}

impl NewFavourite {
    /// Snapshot a logged meal under a name.
    #[must_use]
    pub fn from_meal(name: String, meal: &Meal) -> Self {
        Self {
            name,
            content: meal.content.clone(),
            parsed: meal.parsed.clone(),
            total_calories: meal.total_calories,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn into_favourite(self, id: RecordId) -> Favourite {
        Favourite {
            id,
            name: self.name,
            content: self.content,
            parsed: self.parsed,
            total_calories: self.total_calories,
            created_at: self.created_at,
        }
    }
}

// --- Weight ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    #[serde(default)]
    pub id: RecordId,
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWeightEntry {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub timestamp: DateTime<Utc>,
}

impl NewWeightEntry {
    #[must_use]
    pub fn into_entry(self, id: RecordId) -> WeightEntry {
        WeightEntry {
            id,
            date: self.date,
            weight_kg: self.weight_kg,
            timestamp: self.timestamp,
        }
    }
}

// --- Recipes ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub weight_g: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeTotals {
    pub weight_g: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
}

impl RecipeTotals {
    #[must_use]
    pub fn sum(ingredients: &[Ingredient]) -> Self {
        ingredients.iter().fold(Self::default(), |acc, i| Self {
            weight_g: acc.weight_g + i.weight_g,
            calories: acc.calories + i.calories,
            protein: acc.protein + i.protein,
            fat: acc.fat + i.fat,
            carbs: acc.carbs + i.carbs,
            fiber: acc.fiber + i.fiber,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    pub ingredients: Vec<Ingredient>,
    pub totals: RecipeTotals,
    pub created_at: DateTime<Utc>,
}

impl Recipe {
    /// Macros for `grams` of this recipe, scaled linearly by weight.
    ///
    /// Returns `None` when the recipe has no recorded weight to scale against.
    #[must_use]
    pub fn portion(&self, grams: f64) -> Option<MacroBreakdown> {
        if self.totals.weight_g <= 0.0 {
            return None;
        }
        let factor = grams / self.totals.weight_g;
        let scale = |v: f64| (v * factor).round() as i64;
        Some(MacroBreakdown {
            food: format!("{} ({grams:.0}g)", self.name),
            calories: scale(self.totals.calories),
            protein: scale(self.totals.protein),
            fat: scale(self.totals.fat),
            carbs: scale(self.totals.carbs),
            fiber: scale(self.totals.fiber),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    pub ingredients: Vec<Ingredient>,
    pub totals: RecipeTotals,
    pub created_at: DateTime<Utc>,
}

impl NewRecipe {
    /// Totals are computed here, once, and stored with the recipe.
    #[must_use]
    pub fn from_ingredients(name: String, ingredients: Vec<Ingredient>) -> Self {
        let totals = RecipeTotals::sum(&ingredients);
        Self {
            name,
            ingredients,
            totals,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn into_recipe(self, id: RecordId) -> Recipe {
        Recipe {
            id,
            name: self.name,
            ingredients: self.ingredients,
            totals: self.totals,
            created_at: self.created_at,
        }
    }
}

// --- Settings ---

pub const DEFAULT_CALORIE_GOAL: i64 = 2000;
pub const DEFAULT_PROTEIN_GOAL: i64 = 120;
pub const DEFAULT_CARBS_GOAL: i64 = 250;
pub const DEFAULT_FAT_GOAL: i64 = 70;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub api_key: Option<String>,
    pub calorie_goal: i64,
    pub protein_goal: i64,
    pub carbs_goal: i64,
    pub fat_goal: i64,
    pub bowl_g: i64,
    pub plate_g: i64,
    pub glass_ml: i64,
    pub spoon_g: i64,
    pub age: Option<i64>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            calorie_goal: DEFAULT_CALORIE_GOAL,
            protein_goal: DEFAULT_PROTEIN_GOAL,
            carbs_goal: DEFAULT_CARBS_GOAL,
            fat_goal: DEFAULT_FAT_GOAL,
            bowl_g: 300,
            plate_g: 400,
            glass_ml: 250,
            spoon_g: 15,
            age: None,
            weight_kg: None,
            height_cm: None,
        }
    }
}

impl UserSettings {
    /// The configured API key, treating an empty string as unset.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Defaults overlaid with whatever fields the patch carries.
    #[must_use]
    pub fn from_patch(patch: &SettingsPatch) -> Self {
        let mut settings = Self::default();
        settings.apply(patch);
        settings
    }

    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(ref key) = patch.api_key {
            self.api_key = Some(key.clone());
        }
        if let Some(v) = patch.calorie_goal {
            self.calorie_goal = v;
        }
        if let Some(v) = patch.protein_goal {
            self.protein_goal = v;
        }
        if let Some(v) = patch.carbs_goal {
            self.carbs_goal = v;
        }
        if let Some(v) = patch.fat_goal {
            self.fat_goal = v;
        }
        if let Some(v) = patch.bowl_g {
            self.bowl_g = v;
        }
        if let Some(v) = patch.plate_g {
            self.plate_g = v;
        }
        if let Some(v) = patch.glass_ml {
            self.glass_ml = v;
        }
        if let Some(v) = patch.spoon_g {
            self.spoon_g = v;
        }
        if patch.age.is_some() {
            self.age = patch.age;
        }
        if patch.weight_kg.is_some() {
            self.weight_kg = patch.weight_kg;
        }
        if patch.height_cm.is_some() {
            self.height_cm = patch.height_cm;
        }
    }
}

/// A partial settings update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calorie_goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bowl_g: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_g: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glass_ml: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoon_g: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
}

impl SettingsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The patch as a JSON object holding only the fields it sets.
    pub fn to_fields(&self) -> serde_json::Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(serde_json::Map::new()),
        }
    }
}

// --- Summaries ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroTotals {
    pub calories: i64,
    pub protein: i64,
    pub fat: i64,
    pub carbs: i64,
    pub fiber: i64,
}

impl MacroTotals {
    #[must_use]
    pub fn of_meals(meals: &[Meal]) -> Self {
        meals
            .iter()
            .flat_map(|m| m.parsed.iter())
            .fold(Self::default(), |acc, p| Self {
                calories: acc.calories + p.calories,
                protein: acc.protein + p.protein,
                fat: acc.fat + p.fat,
                carbs: acc.carbs + p.carbs,
                fiber: acc.fiber + p.fiber,
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub meals: Vec<Meal>,
    pub totals: MacroTotals,
    pub calorie_goal: i64,
    pub protein_goal: i64,
    pub carbs_goal: i64,
    pub fat_goal: i64,
}

impl DailySummary {
    #[must_use]
    pub fn calories_remaining(&self) -> i64 {
        self.calorie_goal - self.totals.calories
    }
}

/// Per-day totals used to build the advisory prompts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub totals: MacroTotals,
    pub meal_count: usize,
}

// --- Export ---

pub const EXPORT_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: i64,
    pub exported_at: String,
    pub meals: Vec<Meal>,
}

// --- Validation ---

pub fn validate_weight_kg(kg: f64) -> Result<()> {
    if !kg.is_finite() || kg <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    if kg >= 1000.0 {
        bail!("Weight must be less than 1000 kg (got {kg})");
    }
    Ok(())
}

pub fn validate_portion_grams(grams: f64) -> Result<()> {
    if !grams.is_finite() || grams <= 0.0 {
        bail!("Portion must be greater than 0 grams");
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Name must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date '{date}'. Must be YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recipe() -> Recipe {
        NewRecipe::from_ingredients(
            "Chili".to_string(),
            vec![
                Ingredient {
                    name: "beef".to_string(),
                    weight_g: 200.0,
                    calories: 500.0,
                    protein: 35.0,
                    fat: 30.0,
                    carbs: 0.0,
                    fiber: 0.0,
                },
                Ingredient {
                    name: "beans".to_string(),
                    weight_g: 100.0,
                    calories: 100.0,
                    protein: 5.0,
                    fat: 1.0,
                    carbs: 18.0,
                    fiber: 6.0,
                },
            ],
        )
        .into_recipe(RecordId::from(1))
    }

    #[test]
    fn test_recipe_totals_are_ingredient_sums() {
        let recipe = sample_recipe();
        assert!((recipe.totals.weight_g - 300.0).abs() < f64::EPSILON);
        assert!((recipe.totals.calories - 600.0).abs() < f64::EPSILON);
        assert!((recipe.totals.protein - 40.0).abs() < f64::EPSILON);
        assert!((recipe.totals.fiber - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recipe_portion_scales_linearly() {
        let recipe = sample_recipe();
        let portion = recipe.portion(150.0).unwrap();
        assert_eq!(portion.calories, 300);
        assert_eq!(portion.protein, 20);
        assert_eq!(portion.carbs, 9);
        assert_eq!(portion.fiber, 3);
        assert_eq!(portion.food, "Chili (150g)");
    }

    #[test]
    fn test_recipe_portion_without_weight() {
        let mut recipe = sample_recipe();
        recipe.totals.weight_g = 0.0;
        assert!(recipe.portion(100.0).is_none());
    }

    #[test]
    fn test_new_meal_total_is_sum_of_parsed() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let meal = NewMeal::from_parsed(
            date,
            "eggs and toast".to_string(),
            vec![
                MacroBreakdown {
                    food: "eggs".to_string(),
                    calories: 140,
                    ..MacroBreakdown::default()
                },
                MacroBreakdown {
                    food: "toast".to_string(),
                    calories: 90,
                    ..MacroBreakdown::default()
                },
            ],
        );
        assert_eq!(meal.total_calories, 230);
    }

    #[test]
    fn test_settings_patch_merges_only_set_fields() {
        let mut settings = UserSettings::default();
        settings.apply(&SettingsPatch {
            protein_goal: Some(160),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.protein_goal, 160);
        assert_eq!(settings.calorie_goal, DEFAULT_CALORIE_GOAL);
        assert_eq!(settings.fat_goal, DEFAULT_FAT_GOAL);
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_settings_patch_fields_skip_unset() {
        let patch = SettingsPatch {
            age: Some(34),
            height_cm: Some(180.5),
            ..SettingsPatch::default()
        };
        let fields = patch.to_fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["age"], 34);
        assert!(SettingsPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let settings = UserSettings {
            api_key: Some("   ".to_string()),
            ..UserSettings::default()
        };
        assert!(settings.api_key().is_none());
    }

    #[test]
    fn test_macro_totals_of_meals() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let meal = NewMeal::from_parsed(
            date,
            "lunch".to_string(),
            vec![MacroBreakdown {
                food: "rice".to_string(),
                calories: 200,
                protein: 4,
                fat: 1,
                carbs: 44,
                fiber: 1,
            }],
        )
        .into_meal(RecordId::from(1));
        let totals = MacroTotals::of_meals(&[meal.clone(), meal]);
        assert_eq!(totals.calories, 400);
        assert_eq!(totals.carbs, 88);
    }

    #[test]
    fn test_meal_date_serializes_as_iso_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let meal = NewMeal::from_parsed(date, "x".to_string(), vec![]).into_meal("abc".into());
        let json = serde_json::to_value(&meal).unwrap();
        assert_eq!(json["date"], "2024-06-15");
        assert_eq!(json["id"], "abc");
    }

    #[test]
    fn test_validate_weight() {
        assert!(validate_weight_kg(72.5).is_ok());
        assert!(validate_weight_kg(0.0).is_err());
        assert!(validate_weight_kg(-3.0).is_err());
        assert!(validate_weight_kg(1500.0).is_err());
        assert!(validate_weight_kg(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  oats  ").unwrap(), "oats");
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2024-06-15").is_ok());
        assert!(parse_date("15/06/2024").is_err());
    }

    #[test]
    fn test_record_id_rowid() {
        assert_eq!(RecordId::from(42).as_rowid(), Some(42));
        assert_eq!(RecordId::from("f3a1-uuid").as_rowid(), None);
    }
}
