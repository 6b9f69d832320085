//! Prompt text sent to the assistant.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::models::{DailyTotals, Meal, UserSettings};

/// What the assistant needs to know about the user's day.
pub struct PromptContext<'a> {
    pub today: NaiveDate,
    pub meals: &'a [Meal],
    pub recipe_names: &'a [String],
    pub settings: &'a UserSettings,
}

const INTENT_FORMATS: &str = r#"Reply with exactly one compact JSON object and nothing else. Use one of these shapes:
{"type":"meal","food":"short description","calories":0,"protein":0,"fat":0,"carbs":0,"fiber":0}
{"type":"save_favourite","name":"favourite name"}
{"type":"log_favourite","name":"favourite name"}
{"type":"weight","kg":0.0}
{"type":"height","cm":0.0}
{"type":"age","years":0}
{"type":"recipe","name":"saved recipe name","grams":0}
{"type":"chat","message":"your reply"}
Macros are whole grams, calories are kcal. Use "recipe" only for one of the saved recipes listed above.
Use "chat" for questions or anything that is not one of the other actions."#;

/// The prompt that classifies one chat message.
#[must_use]
pub fn intent_prompt(input: &str, ctx: &PromptContext<'_>) -> String {
    let s = ctx.settings;
    let mut prompt = String::from(
        "You are a nutrition logging assistant. Work out what the user wants and estimate macros for any food they ate.\n\n",
    );

    let _ = writeln!(prompt, "Today is {}.", ctx.today.format("%Y-%m-%d"));
    let _ = writeln!(
        prompt,
        "Daily goals: {} kcal, {} g protein, {} g carbs, {} g fat.",
        s.calorie_goal, s.protein_goal, s.carbs_goal, s.fat_goal
    );
    let _ = writeln!(
        prompt,
        "Portion sizes for this user: bowl = {} g, plate = {} g, glass = {} ml, spoon = {} g.",
        s.bowl_g, s.plate_g, s.glass_ml, s.spoon_g
    );

    if ctx.meals.is_empty() {
        prompt.push_str("Nothing has been logged today.\n");
    } else {
        prompt.push_str("Logged today:\n");
        for meal in ctx.meals {
            let _ = writeln!(prompt, "- {} ({} kcal)", meal.content, meal.total_calories);
        }
    }

    if !ctx.recipe_names.is_empty() {
        let _ = writeln!(prompt, "Saved recipes: {}.", ctx.recipe_names.join(", "));
    }

    prompt.push('\n');
    prompt.push_str(INTENT_FORMATS);
    let _ = write!(prompt, "\n\nUser message: {input}");
    prompt
}

/// The prompt that turns a free-text ingredient list into JSON.
#[must_use]
pub fn ingredients_prompt(text: &str) -> String {
    format!(
        "Convert this ingredient list into a JSON array. Each element must be \
         {{\"name\":\"...\",\"weight_g\":0,\"calories\":0,\"protein\":0,\"fat\":0,\"carbs\":0,\"fiber\":0}} \
         with values for the stated amount. Reply with the JSON array only.\n\nIngredients:\n{text}"
    )
}

fn history_block(history: &[DailyTotals]) -> String {
    let mut block = String::new();
    for day in history {
        let t = &day.totals;
        let _ = writeln!(
            block,
            "{}: {} kcal, {} g protein, {} g carbs, {} g fat, {} g fiber ({} meals)",
            day.date.format("%Y-%m-%d"),
            t.calories,
            t.protein,
            t.carbs,
            t.fat,
            t.fiber,
            day.meal_count
        );
    }
    block
}

fn goals_line(s: &UserSettings) -> String {
    format!(
        "Goals: {} kcal, {} g protein, {} g carbs, {} g fat per day.",
        s.calorie_goal, s.protein_goal, s.carbs_goal, s.fat_goal
    )
}

/// Ask for one meal idea that fits what is left of today's goals.
#[must_use]
pub fn suggestion_prompt(history: &[DailyTotals], settings: &UserSettings) -> String {
    format!(
        "Here are the user's recent daily totals:\n{}\n{}\n\
         Suggest one meal for their next eating occasion that fits their usual pattern and \
         what is left of today's goals. Answer in two or three plain sentences, no JSON.",
        history_block(history),
        goals_line(settings)
    )
}

/// Ask for a short observation about the past week.
#[must_use]
pub fn weekly_prompt(history: &[DailyTotals], settings: &UserSettings) -> String {
    format!(
        "Here are the user's daily totals for the past week:\n{}\n{}\n\
         Give one short, encouraging observation about the week and one concrete thing to \
         try next week. Plain text, at most three sentences, no JSON.",
        history_block(history),
        goals_line(settings)
    )
}
