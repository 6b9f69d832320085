use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    Favourite, Meal, NewFavourite, NewMeal, NewRecipe, NewWeightEntry, Recipe, RecipeTotals,
    RecordId, SettingsPatch, UserSettings, WeightEntry,
};
use crate::store::EntityStore;

/// The guest-mode backend: one SQLite file on this device.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let store = LocalStore {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = LocalStore {
            conn: Mutex::new(conn),
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
                "CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    content TEXT NOT NULL,
                    parsed TEXT NOT NULL,
                    total_calories INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS favourites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    content TEXT NOT NULL,
                    parsed TEXT NOT NULL,
                    total_calories INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weights (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    timestamp TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    ingredients TEXT NOT NULL,
                    totals TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meals_date ON meals(date);
                CREATE INDEX IF NOT EXISTS idx_weights_date ON weights(date);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Only the settings fields that were explicitly written, without defaults.
    pub fn stored_settings(&self) -> StoreResult<SettingsPatch> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM user_settings")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = serde_json::Map::new();
        for (key, value) in rows {
            fields.insert(key, serde_json::from_str(&value)?);
        }
        Ok(serde_json::from_value(serde_json::Value::Object(fields))?)
    }

    // --- Row mapping helpers ---

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: RecordId::from(row.get::<_, i64>(0)?),
            date: date_column(row, 1)?,
            timestamp: timestamp_column(row, 2)?,
            content: row.get(3)?,
            parsed: json_column(row, 4)?,
            total_calories: row.get(5)?,
        })
    }

    fn favourite_from_row(row: &rusqlite::Row) -> rusqlite::Result<Favourite> {
        Ok(Favourite {
            id: RecordId::from(row.get::<_, i64>(0)?),
            name: row.get(1)?,
            content: row.get(2)?,
            parsed: json_column(row, 3)?,
            total_calories: row.get(4)?,
            created_at: timestamp_column(row, 5)?,
        })
    }

    fn weight_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        Ok(WeightEntry {
            id: RecordId::from(row.get::<_, i64>(0)?),
            date: date_column(row, 1)?,
            weight_kg: row.get(2)?,
            timestamp: timestamp_column(row, 3)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let totals: RecipeTotals = json_column(row, 3)?;
        Ok(Recipe {
            id: RecordId::from(row.get::<_, i64>(0)?),
            name: row.get(1)?,
            ingredients: json_column(row, 2)?,
            totals,
            created_at: timestamp_column(row, 4)?,
        })
    }

    fn query_all<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
    ) -> StoreResult<Vec<T>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn delete_row(&self, table: &str, id: &RecordId) -> StoreResult<()> {
        let Some(rowid) = id.as_rowid() else {
            return Ok(());
        };
        self.conn()
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![rowid])?;
        Ok(())
    }
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Map a UNIQUE violation onto the typed duplicate error.
fn unique_violation(err: rusqlite::Error, entity: &'static str, name: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Duplicate {
                entity,
                name: name.to_string(),
            }
        }
        other => StoreError::Database(other),
    }
}

fn require_updated(rows: usize, entity: &'static str, id: &RecordId) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::NotFound {
            entity,
            id: id.clone(),
        });
    }
    Ok(())
}

const MEAL_COLUMNS: &str = "id, date, timestamp, content, parsed, total_calories";
const FAVOURITE_COLUMNS: &str = "id, name, content, parsed, total_calories, created_at";
const WEIGHT_COLUMNS: &str = "id, date, weight_kg, timestamp";
const RECIPE_COLUMNS: &str = "id, name, ingredients, totals, created_at";

#[async_trait]
impl EntityStore for LocalStore {
    // --- Meals ---

    async fn add_meal(&self, meal: &NewMeal) -> StoreResult<Meal> {
        let parsed = serde_json::to_string(&meal.parsed)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO meals (date, timestamp, content, parsed, total_calories)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format_date(meal.date),
                meal.timestamp.to_rfc3339(),
                meal.content,
                parsed,
                meal.total_calories,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(meal.clone().into_meal(RecordId::from(id)))
    }

    async fn get_meal(&self, id: &RecordId) -> StoreResult<Option<Meal>> {
        let Some(rowid) = id.as_rowid() else {
            return Ok(None);
        };
        let meal = self
            .conn()
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![rowid],
                Self::meal_from_row,
            )
            .optional()?;
        Ok(meal)
    }

    async fn meals_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Meal>> {
        self.query_all(
            &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE date = ?1 ORDER BY id"),
            params![format_date(date)],
            Self::meal_from_row,
        )
    }

    async fn all_meals(&self) -> StoreResult<Vec<Meal>> {
        self.query_all(
            &format!("SELECT {MEAL_COLUMNS} FROM meals ORDER BY id"),
            [],
            Self::meal_from_row,
        )
    }

    async fn update_meal(&self, meal: &Meal) -> StoreResult<()> {
        let Some(rowid) = meal.id.as_rowid() else {
            return require_updated(0, "meal", &meal.id);
        };
        let parsed = serde_json::to_string(&meal.parsed)?;
        let rows = self.conn().execute(
            "UPDATE meals SET date = ?1, timestamp = ?2, content = ?3, parsed = ?4, total_calories = ?5
             WHERE id = ?6",
            params![
                format_date(meal.date),
                meal.timestamp.to_rfc3339(),
                meal.content,
                parsed,
                meal.total_calories,
                rowid,
            ],
        )?;
        require_updated(rows, "meal", &meal.id)
    }

    async fn delete_meal(&self, id: &RecordId) -> StoreResult<()> {
        self.delete_row("meals", id)
    }

    // --- Favourites ---

    async fn add_favourite(&self, favourite: &NewFavourite) -> StoreResult<Favourite> {
        let parsed = serde_json::to_string(&favourite.parsed)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO favourites (name, content, parsed, total_calories, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                favourite.name,
                favourite.content,
                parsed,
                favourite.total_calories,
                favourite.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| unique_violation(e, "favourite", &favourite.name))?;
        let id = conn.last_insert_rowid();
        Ok(favourite.clone().into_favourite(RecordId::from(id)))
    }

    async fn favourite_by_name(&self, name: &str) -> StoreResult<Option<Favourite>> {
        let favourite = self
            .conn()
            .query_row(
                &format!("SELECT {FAVOURITE_COLUMNS} FROM favourites WHERE name = ?1"),
                params![name],
                Self::favourite_from_row,
            )
            .optional()?;
        Ok(favourite)
    }

    async fn all_favourites(&self) -> StoreResult<Vec<Favourite>> {
        self.query_all(
            &format!("SELECT {FAVOURITE_COLUMNS} FROM favourites ORDER BY id"),
            [],
            Self::favourite_from_row,
        )
    }

    async fn update_favourite(&self, favourite: &Favourite) -> StoreResult<()> {
        let Some(rowid) = favourite.id.as_rowid() else {
            return require_updated(0, "favourite", &favourite.id);
        };
        let parsed = serde_json::to_string(&favourite.parsed)?;
        let rows = self
            .conn()
            .execute(
                "UPDATE favourites SET name = ?1, content = ?2, parsed = ?3, total_calories = ?4, created_at = ?5
                 WHERE id = ?6",
                params![
                    favourite.name,
                    favourite.content,
                    parsed,
                    favourite.total_calories,
                    favourite.created_at.to_rfc3339(),
                    rowid,
                ],
            )
            .map_err(|e| unique_violation(e, "favourite", &favourite.name))?;
        require_updated(rows, "favourite", &favourite.id)
    }

    async fn delete_favourite(&self, id: &RecordId) -> StoreResult<()> {
        self.delete_row("favourites", id)
    }

    // --- Weight ---

    async fn add_weight(&self, entry: &NewWeightEntry) -> StoreResult<WeightEntry> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO weights (date, weight_kg, timestamp) VALUES (?1, ?2, ?3)",
            params![
                format_date(entry.date),
                entry.weight_kg,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(entry.clone().into_entry(RecordId::from(id)))
    }

    async fn weights_for_date(&self, date: NaiveDate) -> StoreResult<Vec<WeightEntry>> {
        self.query_all(
            &format!("SELECT {WEIGHT_COLUMNS} FROM weights WHERE date = ?1 ORDER BY id"),
            params![format_date(date)],
            Self::weight_from_row,
        )
    }

    async fn all_weights(&self) -> StoreResult<Vec<WeightEntry>> {
        self.query_all(
            &format!("SELECT {WEIGHT_COLUMNS} FROM weights ORDER BY id"),
            [],
            Self::weight_from_row,
        )
    }

    async fn update_weight(&self, entry: &WeightEntry) -> StoreResult<()> {
        let Some(rowid) = entry.id.as_rowid() else {
            return require_updated(0, "weight entry", &entry.id);
        };
        let rows = self.conn().execute(
            "UPDATE weights SET date = ?1, weight_kg = ?2, timestamp = ?3 WHERE id = ?4",
            params![
                format_date(entry.date),
                entry.weight_kg,
                entry.timestamp.to_rfc3339(),
                rowid,
            ],
        )?;
        require_updated(rows, "weight entry", &entry.id)
    }

    async fn delete_weight(&self, id: &RecordId) -> StoreResult<()> {
        self.delete_row("weights", id)
    }

    // --- Recipes ---

    async fn add_recipe(&self, recipe: &NewRecipe) -> StoreResult<Recipe> {
        let ingredients = serde_json::to_string(&recipe.ingredients)?;
        let totals = serde_json::to_string(&recipe.totals)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO recipes (name, ingredients, totals, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                recipe.name,
                ingredients,
                totals,
                recipe.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| unique_violation(e, "recipe", &recipe.name))?;
        let id = conn.last_insert_rowid();
        Ok(recipe.clone().into_recipe(RecordId::from(id)))
    }

    async fn recipe_by_name(&self, name: &str) -> StoreResult<Option<Recipe>> {
        let recipe = self
            .conn()
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE name = ?1"),
                params![name],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    async fn all_recipes(&self) -> StoreResult<Vec<Recipe>> {
        self.query_all(
            &format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY id"),
            [],
            Self::recipe_from_row,
        )
    }

    async fn update_recipe(&self, recipe: &Recipe) -> StoreResult<()> {
        let Some(rowid) = recipe.id.as_rowid() else {
            return require_updated(0, "recipe", &recipe.id);
        };
        let ingredients = serde_json::to_string(&recipe.ingredients)?;
        let totals = serde_json::to_string(&recipe.totals)?;
        let rows = self
            .conn()
            .execute(
                "UPDATE recipes SET name = ?1, ingredients = ?2, totals = ?3, created_at = ?4
                 WHERE id = ?5",
                params![
                    recipe.name,
                    ingredients,
                    totals,
                    recipe.created_at.to_rfc3339(),
                    rowid,
                ],
            )
            .map_err(|e| unique_violation(e, "recipe", &recipe.name))?;
        require_updated(rows, "recipe", &recipe.id)
    }

    async fn delete_recipe(&self, id: &RecordId) -> StoreResult<()> {
        self.delete_row("recipes", id)
    }

    // --- Settings ---

    async fn get_settings(&self) -> StoreResult<UserSettings> {
        Ok(UserSettings::from_patch(&self.stored_settings()?))
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> StoreResult<UserSettings> {
        let fields = patch.to_fields()?;
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for (key, value) in &fields {
                tx.execute(
                    "INSERT INTO user_settings (key, value, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value.to_string(), now],
                )?;
            }
            tx.commit()?;
        }
        self.get_settings().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ingredient, MacroBreakdown};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn sample_meal(date: NaiveDate) -> NewMeal {
        NewMeal::from_parsed(
            date,
            "two eggs and toast".to_string(),
            vec![
                MacroBreakdown {
                    food: "eggs".to_string(),
                    calories: 140,
                    protein: 12,
                    fat: 10,
                    carbs: 1,
                    fiber: 0,
                },
                MacroBreakdown {
                    food: "toast".to_string(),
                    calories: 90,
                    protein: 3,
                    fat: 1,
                    carbs: 17,
                    fiber: 2,
                },
            ],
        )
    }

    fn sample_favourite(name: &str) -> NewFavourite {
        NewFavourite {
            name: name.to_string(),
            content: "oats with milk".to_string(),
            parsed: vec![MacroBreakdown {
                food: "oats".to_string(),
                calories: 300,
                ..MacroBreakdown::default()
            }],
            total_calories: 300,
            created_at: Utc::now(),
        }
    }

    fn sample_recipe(name: &str) -> NewRecipe {
        NewRecipe::from_ingredients(
            name.to_string(),
            vec![Ingredient {
                name: "lentils".to_string(),
                weight_g: 250.0,
                calories: 290.0,
                protein: 22.0,
                fat: 1.0,
                carbs: 50.0,
                fiber: 20.0,
            }],
        )
    }

    #[tokio::test]
    async fn test_meal_round_trip_by_date() {
        let db = LocalStore::open_in_memory().unwrap();
        let added = db.add_meal(&sample_meal(day(15))).await.unwrap();

        let meals = db.meals_for_date(day(15)).await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0], added);
        assert_eq!(meals[0].parsed.len(), 2);
        assert_eq!(meals[0].parsed[1].food, "toast");
        assert_eq!(meals[0].total_calories, 230);

        assert!(db.meals_for_date(day(16)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_meals_keep_insertion_order() {
        let db = LocalStore::open_in_memory().unwrap();
        let first = db.add_meal(&sample_meal(day(15))).await.unwrap();
        let second = db.add_meal(&sample_meal(day(15))).await.unwrap();
        let meals = db.all_meals().await.unwrap();
        assert_eq!(meals[0].id, first.id);
        assert_eq!(meals[1].id, second.id);
    }

    #[tokio::test]
    async fn test_update_meal_replaces_record() {
        let db = LocalStore::open_in_memory().unwrap();
        let mut meal = db.add_meal(&sample_meal(day(15))).await.unwrap();
        meal.content = "three eggs".to_string();
        meal.total_calories = 210;
        db.update_meal(&meal).await.unwrap();

        let stored = db.get_meal(&meal.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "three eggs");
        assert_eq!(stored.total_calories, 210);
    }

    #[tokio::test]
    async fn test_update_missing_meal_is_not_found() {
        let db = LocalStore::open_in_memory().unwrap();
        let meal = sample_meal(day(15)).into_meal(RecordId::from(99));
        let err = db.update_meal(&meal).await.unwrap_err();
        assert!(err.is_not_found());

        let foreign = sample_meal(day(15)).into_meal(RecordId::from("not-a-rowid"));
        assert!(db.update_meal(&foreign).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let db = LocalStore::open_in_memory().unwrap();
        let keep = db.add_meal(&sample_meal(day(15))).await.unwrap();
        let gone = db.add_meal(&sample_meal(day(15))).await.unwrap();

        db.delete_meal(&gone.id).await.unwrap();
        db.delete_meal(&gone.id).await.unwrap();
        db.delete_meal(&RecordId::from("unknown")).await.unwrap();

        let meals = db.all_meals().await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].id, keep.id);
    }

    #[tokio::test]
    async fn test_favourite_name_is_unique() {
        let db = LocalStore::open_in_memory().unwrap();
        db.add_favourite(&sample_favourite("breakfast")).await.unwrap();
        let err = db
            .add_favourite(&sample_favourite("breakfast"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(err.to_string(), "A favourite named 'breakfast' already exists");
        assert_eq!(db.all_favourites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_favourite_by_name() {
        let db = LocalStore::open_in_memory().unwrap();
        let added = db.add_favourite(&sample_favourite("oats")).await.unwrap();
        let found = db.favourite_by_name("oats").await.unwrap().unwrap();
        assert_eq!(found, added);
        assert!(db.favourite_by_name("pizza").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_favourite() {
        let db = LocalStore::open_in_memory().unwrap();
        let mut fav = db.add_favourite(&sample_favourite("oats")).await.unwrap();
        fav.name = "porridge".to_string();
        fav.total_calories = 410;
        db.update_favourite(&fav).await.unwrap();

        let found = db.favourite_by_name("porridge").await.unwrap().unwrap();
        assert_eq!(found.total_calories, 410);
        assert!(db.favourite_by_name("oats").await.unwrap().is_none());

        fav.id = RecordId::from("999");
        let err = db.update_favourite(&fav).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "No favourite with id 999");
    }

    #[tokio::test]
    async fn test_update_missing_weight_or_recipe_is_not_found() {
        let db = LocalStore::open_in_memory().unwrap();
        let ghost_weight = WeightEntry {
            id: RecordId::from("999"),
            date: day(15),
            weight_kg: 70.0,
            timestamp: Utc::now(),
        };
        let err = db.update_weight(&ghost_weight).await.unwrap_err();
        assert_eq!(err.to_string(), "No weight entry with id 999");

        let ghost_recipe = sample_recipe("ghost").into_recipe(RecordId::from("999"));
        assert!(db.update_recipe(&ghost_recipe).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_recipe_name_is_unique() {
        let db = LocalStore::open_in_memory().unwrap();
        db.add_recipe(&sample_recipe("dal")).await.unwrap();
        let err = db.add_recipe(&sample_recipe("dal")).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_recipe_rename_into_existing_name_is_duplicate() {
        let db = LocalStore::open_in_memory().unwrap();
        db.add_recipe(&sample_recipe("dal")).await.unwrap();
        let mut soup = db.add_recipe(&sample_recipe("soup")).await.unwrap();
        soup.name = "dal".to_string();
        assert!(db.update_recipe(&soup).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn test_recipe_totals_survive_storage() {
        let db = LocalStore::open_in_memory().unwrap();
        db.add_recipe(&sample_recipe("dal")).await.unwrap();
        let recipe = db.recipe_by_name("dal").await.unwrap().unwrap();
        assert!((recipe.totals.weight_g - 250.0).abs() < f64::EPSILON);
        assert!((recipe.totals.fiber - 20.0).abs() < f64::EPSILON);
        assert_eq!(recipe.ingredients.len(), 1);
    }

    #[tokio::test]
    async fn test_weights_by_date() {
        let db = LocalStore::open_in_memory().unwrap();
        let entry = NewWeightEntry {
            date: day(15),
            weight_kg: 72.4,
            timestamp: Utc::now(),
        };
        let added = db.add_weight(&entry).await.unwrap();
        let found = db.weights_for_date(day(15)).await.unwrap();
        assert_eq!(found, vec![added.clone()]);

        let mut changed = added;
        changed.weight_kg = 71.9;
        db.update_weight(&changed).await.unwrap();
        let all = db.all_weights().await.unwrap();
        assert!((all[0].weight_kg - 71.9).abs() < f64::EPSILON);

        db.delete_weight(&changed.id).await.unwrap();
        assert!(db.all_weights().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_default_when_absent() {
        let db = LocalStore::open_in_memory().unwrap();
        assert_eq!(db.get_settings().await.unwrap(), UserSettings::default());
        assert!(db.stored_settings().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_merge_keeps_other_fields() {
        let db = LocalStore::open_in_memory().unwrap();
        db.update_settings(&SettingsPatch {
            api_key: Some("key-123".to_string()),
            calorie_goal: Some(1800),
            ..SettingsPatch::default()
        })
        .await
        .unwrap();

        let settings = db
            .update_settings(&SettingsPatch {
                height_cm: Some(178.0),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();

        assert_eq!(settings.api_key(), Some("key-123"));
        assert_eq!(settings.calorie_goal, 1800);
        assert_eq!(settings.height_cm, Some(178.0));
        assert_eq!(settings.protein_goal, UserSettings::default().protein_goal);

        let stored = db.stored_settings().unwrap();
        assert_eq!(stored.calorie_goal, Some(1800));
        assert!(stored.protein_goal.is_none());
    }

    #[tokio::test]
    async fn test_data_persists_on_disk() {
        let dir = std::env::temp_dir().join(format!("nosh-db-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("nosh.db");
        {
            let db = LocalStore::open(&path).unwrap();
            db.add_meal(&sample_meal(day(15))).await.unwrap();
        }
        let db = LocalStore::open(&path).unwrap();
        assert_eq!(db.all_meals().await.unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
