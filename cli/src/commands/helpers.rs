use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::models::{MacroTotals, Meal};
use nosh_core::service::ServiceError;

const KG_PER_LB: f64 = 0.453_592;
pub(crate) const LBS_PER_KG: f64 = 2.20462;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Convert a weight in `unit` (kg or lbs) to kilograms.
pub(crate) fn weight_to_kg(value: f64, unit: &str) -> Result<f64> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(value * KG_PER_LB),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

/// Service failures reach the terminal as their user-facing text.
pub(crate) fn user_error(err: ServiceError) -> anyhow::Error {
    tracing::debug!(error = ?err, "command failed");
    anyhow::anyhow!(err.user_message())
}

pub(crate) fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Meal")]
        content: String,
        #[tabled(rename = "Cal")]
        calories: i64,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| {
            let t = MacroTotals::of_meals(std::slice::from_ref(m));
            MealRow {
                id: m.id.to_string(),
                date: m.date.format("%Y-%m-%d").to_string(),
                time: m
                    .timestamp
                    .with_timezone(&Local)
                    .format("%H:%M")
                    .to_string(),
                content: truncate(&m.content, 40),
                calories: m.total_calories,
                protein: format!("{}g", t.protein),
                carbs: format!("{}g", t.carbs),
                fat: format!("{}g", t.fat),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
