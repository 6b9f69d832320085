use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nosh_core::models::RecordId;
use nosh_core::service::NoshService;

use super::helpers::{LBS_PER_KG, parse_date, user_error, weight_to_kg};

pub(crate) async fn cmd_weight_log(
    service: &NoshService,
    value: f64,
    unit: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let weight_kg = weight_to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") {
        eprintln!("Converting {value:.1} {unit} → {weight_kg:.2} kg");
    }

    let date = parse_date(date)?;
    let entry = service
        .log_weight(weight_kg, date)
        .await
        .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}",
            entry.weight_kg,
            entry.weight_kg * LBS_PER_KG,
            entry.date.format("%Y-%m-%d")
        );
    }

    Ok(())
}

pub(crate) async fn cmd_weight_history(
    service: &NoshService,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let entries = match date {
        Some(d) => service.weights_for_date(parse_date(Some(d))?).await,
        None => service.weights().await,
    }
    .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No weight entries found. Use `nosh weight log` to record your weight.");
        process::exit(2);
    }

    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        kg: String,
        #[tabled(rename = "Weight (lbs)")]
        lbs: String,
    }

    let rows: Vec<WeightRow> = entries
        .iter()
        .map(|e| WeightRow {
            id: e.id.to_string(),
            date: e.date.format("%Y-%m-%d").to_string(),
            kg: format!("{:.1}", e.weight_kg),
            lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) async fn cmd_weight_delete(service: &NoshService, id: &str, json: bool) -> Result<()> {
    let id = RecordId::from(id);
    service.delete_weight(&id).await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight entry {id}");
    }

    Ok(())
}
