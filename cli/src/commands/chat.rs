use anyhow::{Result, bail};
use chrono::Local;
use serde::Serialize;

use nosh_core::models::Meal;
use nosh_core::service::{CompletionProvider, NoshService, Reply};

use super::helpers::json_error;

#[derive(Serialize)]
struct ChatOutput<'a> {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meal: Option<&'a Meal>,
}

fn logged_meal(reply: &Reply) -> Option<&Meal> {
    match reply {
        Reply::MealLogged(meal)
        | Reply::FavouriteLogged { meal, .. }
        | Reply::RecipeLogged { meal, .. } => Some(meal),
        _ => None,
    }
}

pub(crate) async fn cmd_chat(
    service: &NoshService,
    ai: &dyn CompletionProvider,
    message: &str,
    json: bool,
) -> Result<()> {
    let today = Local::now().date_naive();
    let reply = service.handle_message(ai, message, today).await;

    if reply.is_error() {
        if json {
            println!("{}", json_error(&reply.message()));
            std::process::exit(1);
        }
        bail!(reply.message());
    }

    if json {
        let output = ChatOutput {
            message: reply.message(),
            meal: logged_meal(&reply),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", reply.message());
    if let Some(meal) = logged_meal(&reply) {
        for item in &meal.parsed {
            println!(
                "  {} — {} kcal | P:{}g C:{}g F:{}g Fib:{}g",
                item.food, item.calories, item.protein, item.carbs, item.fat, item.fiber
            );
        }
    }
    Ok(())
}
