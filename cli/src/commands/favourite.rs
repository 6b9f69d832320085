use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::models::RecordId;
use nosh_core::service::NoshService;

use super::helpers::{json_error, parse_date, truncate, user_error};

pub(crate) async fn cmd_favourite_list(service: &NoshService, json: bool) -> Result<()> {
    let favourites = service.favourites().await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&favourites)?);
        return Ok(());
    }

    if favourites.is_empty() {
        eprintln!("No favourites yet. Use `nosh favourite save <name>` after logging a meal.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct FavouriteRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Meal")]
        content: String,
        #[tabled(rename = "Cal")]
        calories: i64,
        #[tabled(rename = "Saved")]
        saved: String,
    }

    let rows: Vec<FavouriteRow> = favourites
        .iter()
        .map(|f| FavouriteRow {
            name: truncate(&f.name, 25),
            content: truncate(&f.content, 40),
            calories: f.total_calories,
            saved: f
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d")
                .to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

/// Save a meal under `name`: the given meal, or today's most recent one.
pub(crate) async fn cmd_favourite_save(
    service: &NoshService,
    name: &str,
    meal_id: Option<String>,
    json: bool,
) -> Result<()> {
    let favourite = match meal_id {
        Some(id) => service.save_meal_as_favourite(name, &RecordId::from(id)).await,
        None => {
            service
                .save_favourite(name, Local::now().date_naive())
                .await
        }
    }
    .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&favourite)?);
    } else {
        println!(
            "Saved '{}' as a favourite ({} kcal)",
            favourite.name, favourite.total_calories
        );
    }
    Ok(())
}

pub(crate) async fn cmd_favourite_log(
    service: &NoshService,
    name: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let meal = service.log_favourite(name, date).await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Logged favourite '{}' for {}: {} kcal",
            name.trim(),
            meal.date.format("%Y-%m-%d"),
            meal.total_calories
        );
    }
    Ok(())
}

pub(crate) async fn cmd_favourite_delete(
    service: &NoshService,
    name: &str,
    json: bool,
) -> Result<()> {
    if service.delete_favourite(name).await.map_err(user_error)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": name.trim() }));
        } else {
            println!("Deleted favourite '{}'", name.trim());
        }
        Ok(())
    } else {
        let message = format!("No favourite named '{}'", name.trim());
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }
}
