use anyhow::Result;
use chrono::Local;

use nosh_core::service::{CompletionProvider, MIN_HISTORY_DAYS, NoshService};

use super::helpers::user_error;

fn print_advice(text: Option<String>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "advice": text }));
        return Ok(());
    }
    match text {
        Some(text) => println!("{text}"),
        None => eprintln!(
            "Not enough to go on yet. Log meals on at least {MIN_HISTORY_DAYS} days of the past week and set an API key."
        ),
    }
    Ok(())
}

pub(crate) async fn cmd_suggest(
    service: &NoshService,
    ai: &dyn CompletionProvider,
    json: bool,
) -> Result<()> {
    let today = Local::now().date_naive();
    let text = service.suggest_meal(ai, today).await.map_err(user_error)?;
    print_advice(text, json)
}

pub(crate) async fn cmd_weekly(
    service: &NoshService,
    ai: &dyn CompletionProvider,
    json: bool,
) -> Result<()> {
    let today = Local::now().date_naive();
    let text = service
        .weekly_observation(ai, today)
        .await
        .map_err(user_error)?;
    print_advice(text, json)
}
