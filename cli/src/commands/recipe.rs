use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::intent::parse_ingredients;
use nosh_core::models::Recipe;
use nosh_core::service::{CompletionProvider, NoshService};

use super::helpers::{json_error, parse_date, truncate, user_error};

/// Create a recipe from a JSON ingredient file, or from free text the
/// assistant turns into ingredients.
pub(crate) async fn cmd_recipe_create(
    service: &NoshService,
    ai: &dyn CompletionProvider,
    name: &str,
    ingredients: Option<String>,
    file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let recipe = match (ingredients, file) {
        (_, Some(path)) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let Some(items) = parse_ingredients(&raw) else {
                bail!(
                    "{} is not a JSON array of ingredients with names",
                    path.display()
                );
            };
            service.save_recipe(name, items).await
        }
        (Some(text), None) => service.create_recipe(ai, name, &text).await,
        (None, None) => bail!("Provide the ingredients as text or with --file"),
    }
    .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!(
            "Created recipe: {} ({} ingredients, {:.0}g, {:.0} kcal)",
            recipe.name,
            recipe.ingredients.len(),
            recipe.totals.weight_g,
            recipe.totals.calories
        );
        println!(
            "Log a portion with: nosh recipe log \"{}\" <grams>",
            recipe.name
        );
    }
    Ok(())
}

fn print_recipe(recipe: &Recipe) {
    let t = &recipe.totals;
    println!("=== {} ===", recipe.name);
    println!("  Total: {:.0}g  |  {:.0} kcal\n", t.weight_g, t.calories);

    println!("  INGREDIENTS:");
    for ing in &recipe.ingredients {
        println!(
            "    {} — {:.0}g — {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
            ing.name, ing.weight_g, ing.calories, ing.protein, ing.carbs, ing.fat
        );
    }

    if let Some(per_100) = recipe.portion(100.0) {
        println!("\n  PER 100g:");
        println!(
            "    {} kcal | P:{}g C:{}g F:{}g Fib:{}g",
            per_100.calories, per_100.protein, per_100.carbs, per_100.fat, per_100.fiber
        );
    }
}

pub(crate) async fn cmd_recipe_show(service: &NoshService, name: &str, json: bool) -> Result<()> {
    let recipe = service.recipe(name).await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        print_recipe(&recipe);
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_list(service: &NoshService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Calories")]
        calories: String,
    }

    let recipes = service.recipes().await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    if recipes.is_empty() {
        eprintln!("No recipes found");
        process::exit(2);
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            name: truncate(&r.name, 30),
            ingredients: r.ingredients.len(),
            weight: format!("{:.0}g", r.totals.weight_g),
            calories: format!("{:.0}", r.totals.calories),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_recipe_log(
    service: &NoshService,
    name: &str,
    grams: f64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let meal = service
        .log_recipe(name, grams, date)
        .await
        .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Logged {} for {}: {} kcal",
            meal.content,
            meal.date.format("%Y-%m-%d"),
            meal.total_calories
        );
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_delete(service: &NoshService, name: &str, json: bool) -> Result<()> {
    if service.delete_recipe(name).await.map_err(user_error)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": name.trim() }));
        } else {
            println!("Deleted recipe '{}'", name.trim());
        }
        Ok(())
    } else {
        let message = format!("No recipe named '{}'", name.trim());
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }
}
