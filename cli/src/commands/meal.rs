use anyhow::{Result, bail};
use std::process;

use nosh_core::models::RecordId;
use nosh_core::service::NoshService;

use super::helpers::{json_error, parse_date, print_meal_table, user_error};

pub(crate) async fn cmd_meals(
    service: &NoshService,
    date: Option<String>,
    all: bool,
    json: bool,
) -> Result<()> {
    let (meals, scope) = if all {
        (service.all_meals().await, "anywhere".to_string())
    } else {
        let date = parse_date(date)?;
        (
            service.meals_for_date(date).await,
            format!("for {}", date.format("%Y-%m-%d")),
        )
    };
    let meals = meals.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        eprintln!("No meals logged {scope}");
        process::exit(2);
    }

    print_meal_table(&meals);
    Ok(())
}

pub(crate) async fn cmd_meal_edit(
    service: &NoshService,
    id: &str,
    content: Option<String>,
    calories: Option<i64>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    if content.is_none() && calories.is_none() && date.is_none() {
        bail!("Nothing to update. Provide at least one of --content, --calories, or --date");
    }

    let id = RecordId::from(id);
    let Some(mut meal) = service.get_meal(&id).await.map_err(user_error)? else {
        if json {
            println!("{}", json_error(&format!("Meal {id} not found")));
        } else {
            eprintln!("Meal {id} not found");
        }
        process::exit(2);
    };

    if let Some(content) = content {
        let content = content.trim();
        if content.is_empty() {
            bail!("Content must not be empty");
        }
        content.clone_into(&mut meal.content);
    }
    if let Some(calories) = calories {
        if calories < 0 {
            bail!("Calories must not be negative");
        }
        meal.total_calories = calories;
    }
    if date.is_some() {
        meal.date = parse_date(date)?;
    }

    service.update_meal(&meal).await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Updated meal {id}: {} on {} — {} kcal",
            meal.content,
            meal.date.format("%Y-%m-%d"),
            meal.total_calories
        );
    }
    Ok(())
}

pub(crate) async fn cmd_meal_delete(service: &NoshService, id: &str, json: bool) -> Result<()> {
    let id = RecordId::from(id);
    if service.get_meal(&id).await.map_err(user_error)?.is_none() {
        if json {
            println!("{}", json_error(&format!("Meal {id} not found")));
        } else {
            eprintln!("Meal {id} not found");
        }
        process::exit(2);
    }

    service.delete_meal(&id).await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}
