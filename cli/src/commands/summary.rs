use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::service::NoshService;

use super::helpers::{parse_date, user_error};

pub(crate) async fn cmd_summary(
    service: &NoshService,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let summary = service.daily_summary(date).await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let date = summary.date.format("%Y-%m-%d");
    if summary.meals.is_empty() {
        eprintln!("No entries for {date}");
        process::exit(2);
    }

    println!("=== {date} ===\n");
    for meal in &summary.meals {
        let id = &meal.id;
        let time = meal.timestamp.with_timezone(&Local).format("%H:%M");
        println!("  [{id}] {time} {} ({} kcal)", meal.content, meal.total_calories);
        for item in &meal.parsed {
            println!(
                "      {} — {} kcal | P:{}g C:{}g F:{}g",
                item.food, item.calories, item.protein, item.carbs, item.fat
            );
        }
    }
    println!();

    let t = &summary.totals;
    println!(
        "  TOTAL: {} kcal | P:{}g C:{}g F:{}g Fib:{}g",
        t.calories, t.protein, t.carbs, t.fat, t.fiber
    );
    println!(
        "  TARGET: {} kcal | P:{}g C:{}g F:{}g",
        summary.calorie_goal, summary.protein_goal, summary.carbs_goal, summary.fat_goal
    );
    println!(
        "  REMAINING: {} kcal | P:{}g C:{}g F:{}g",
        summary.calories_remaining(),
        summary.protein_goal - t.protein,
        summary.carbs_goal - t.carbs,
        summary.fat_goal - t.fat
    );

    Ok(())
}

pub(crate) async fn cmd_history(service: &NoshService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meals")]
        meals: usize,
        #[tabled(rename = "Calories")]
        calories: i64,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let today = Local::now().date_naive();
    let history = service
        .daily_totals(today, u64::from(days))
        .await
        .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = history
        .iter()
        .rev()
        .map(|d| HistoryRow {
            date: d.date.format("%Y-%m-%d").to_string(),
            meals: d.meal_count,
            calories: d.totals.calories,
            protein: format!("{}g", d.totals.protein),
            carbs: format!("{}g", d.totals.carbs),
            fat: format!("{}g", d.totals.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
