use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;

use crate::cloud::CloudStore;
use crate::db::LocalStore;
use crate::error::StoreResult;
use crate::models::{NewFavourite, NewMeal, NewRecipe, NewWeightEntry};
use crate::store::EntityStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub meals: usize,
    pub favourites: usize,
    pub weights: usize,
    pub recipes: usize,
    pub settings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The account already had meals, so nothing was copied.
    AlreadyMigrated,
    Copied(MigrationSummary),
}

type PendingWrite<'a> = BoxFuture<'a, (&'static str, StoreResult<()>)>;

/// Copy all local data into a freshly signed-in account.
///
/// Runs once per account: if the cloud side already holds any meal it is left
/// alone. All writes are issued together; when some fail the ones that
/// succeeded stay, and the first error is returned. The local store is only
/// read.
pub async fn migrate_local_to_cloud(
    local: &LocalStore,
    cloud: &CloudStore,
) -> StoreResult<MigrationOutcome> {
    if cloud.has_meals().await? {
        tracing::info!(user = %cloud.user(), "cloud already has data, skipping migration");
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let meals = local.all_meals().await?;
    let favourites = local.all_favourites().await?;
    let weights = local.all_weights().await?;
    let recipes = local.all_recipes().await?;
    let settings = local.stored_settings()?;

    let summary = MigrationSummary {
        meals: meals.len(),
        favourites: favourites.len(),
        weights: weights.len(),
        recipes: recipes.len(),
        settings: !settings.is_empty(),
    };

    let mut writes: Vec<PendingWrite<'_>> = Vec::new();
    for m in meals {
        let new = NewMeal {
            date: m.date,
            timestamp: m.timestamp,
            content: m.content,
            parsed: m.parsed,
            total_calories: m.total_calories,
        };
        writes.push(async move { ("meal", cloud.add_meal(&new).await.map(drop)) }.boxed());
    }
    for f in favourites {
        let new = NewFavourite {
            name: f.name,
            content: f.content,
            parsed: f.parsed,
            total_calories: f.total_calories,
            created_at: f.created_at,
        };
        writes.push(async move { ("favourite", cloud.add_favourite(&new).await.map(drop)) }.boxed());
    }
    for w in weights {
        let new = NewWeightEntry {
            date: w.date,
            weight_kg: w.weight_kg,
            timestamp: w.timestamp,
        };
        writes.push(async move { ("weight", cloud.add_weight(&new).await.map(drop)) }.boxed());
    }
    for r in recipes {
        let new = NewRecipe {
            name: r.name,
            ingredients: r.ingredients,
            totals: r.totals,
            created_at: r.created_at,
        };
        writes.push(async move { ("recipe", cloud.add_recipe(&new).await.map(drop)) }.boxed());
    }
    if summary.settings {
        writes.push(
            async move { ("settings", cloud.update_settings(&settings).await.map(drop)) }.boxed(),
        );
    }

    let mut first_error = None;
    for (kind, result) in join_all(writes).await {
        if let Err(e) = result {
            tracing::error!(user = %cloud.user(), kind, error = %e, "migration write failed");
            first_error.get_or_insert(e);
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    tracing::info!(user = %cloud.user(), ?summary, "migrated local data to cloud");
    Ok(MigrationOutcome::Copied(summary))
}
