mod commands;
mod config;
mod gemini;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    SettingsArgs, cmd_chat, cmd_export, cmd_favourite_delete, cmd_favourite_list,
    cmd_favourite_log, cmd_favourite_save, cmd_history, cmd_login, cmd_logout, cmd_meal_delete,
    cmd_meal_edit, cmd_meals, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list,
    cmd_recipe_log, cmd_recipe_show, cmd_settings_set, cmd_settings_show, cmd_suggest,
    cmd_summary, cmd_weekly, cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_whoami,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::remote::HttpDocumentStore;
use nosh_core::cloud::{SqliteDocumentStore, UserId};
use nosh_core::db::LocalStore;
use nosh_core::service::NoshService;
use nosh_core::session::Session;

#[derive(Parser)]
#[command(
    name = "nosh",
    version,
    about = "Log meals, weight and macros by chatting",
    long_about = "Log meals, weight and macros by chatting.\n\n\
        Data stays in a local database until you `nosh login`; after that it lives \
        in your account on a `nosh serve` server."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tell the assistant what you ate, weighed, or want to know
    Chat {
        /// Free-text message (e.g. "two eggs and toast", "I weigh 72.5kg")
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals for a day (defaults to today)
    Meals {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// List every meal instead of one day
        #[arg(long, conflicts_with = "date")]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit or delete a logged meal
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Show daily summary (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage favourite meals
    Favourite {
        #[command(subcommand)]
        command: FavouriteCommands,
    },
    /// Manage recipes and log portions of them
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Show or change goals, portion sizes, profile and API key
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Sign in to a nosh server and copy local data into the account
    Login {
        /// Account name
        user: String,
        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
        /// Server API key
        #[arg(long)]
        token: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out and go back to local guest data
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show who is signed in
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export every meal as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Ask for a meal idea based on the past week
    Suggest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Get a short note on the past week
    Weekly {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the account document server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Change a meal's text, calories or date
    Edit {
        /// Meal ID
        id: String,
        /// New description
        #[arg(long)]
        content: Option<String>,
        /// New total calories
        #[arg(long)]
        calories: Option<i64>,
        /// New date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal by ID
    Delete {
        /// Meal ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history
    History {
        /// Only entries for this date
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weight entry by ID
    Delete {
        /// Weight entry ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FavouriteCommands {
    /// List favourites
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a meal as a favourite (default: today's latest meal)
    Save {
        /// Favourite name
        name: String,
        /// Save this meal instead of today's latest
        #[arg(long, value_name = "ID")]
        meal: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a favourite as a new meal
    Log {
        /// Favourite name
        name: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a favourite by name
    Delete {
        /// Favourite name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a recipe from an ingredient list
    Create {
        /// Recipe name
        name: String,
        /// Ingredients as free text (e.g. "500g beef mince, 1 tin tomatoes")
        #[arg(conflicts_with = "file")]
        ingredients: Option<String>,
        /// Read ingredients from a JSON array file instead
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details
    Show {
        /// Recipe name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a portion of a recipe by weight
    Log {
        /// Recipe name
        name: String,
        /// Portion in grams
        grams: f64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe by name
    Delete {
        /// Recipe name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings
    Set {
        #[command(flatten)]
        args: SettingsArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NOSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Build the session for the persisted sign-in state.
fn open_session(config: &Config) -> Result<Session> {
    match config.load_account()? {
        Some(account) => {
            let user = UserId::new(account.user)?;
            let docs = HttpDocumentStore::new(&account.server, account.token)?;
            tracing::debug!(%user, "using account storage");
            Ok(Session::signed_in(user, Arc::new(docs)))
        }
        None => {
            let local = LocalStore::open(&config.db_path)?;
            Ok(Session::guest(Arc::new(local)))
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = || -> Result<NoshService> { Ok(NoshService::new(open_session(&config)?)) };
    let ai = || GeminiClient::new(&config.ai_endpoint, &config.ai_model);

    match cli.command {
        Commands::Chat { message, json } => {
            cmd_chat(&service()?, &ai()?, &message.join(" "), json).await
        }
        Commands::Meals { date, all, json } => cmd_meals(&service()?, date, all, json).await,
        Commands::Meal { command } => match command {
            MealCommands::Edit {
                id,
                content,
                calories,
                date,
                json,
            } => cmd_meal_edit(&service()?, &id, content, calories, date, json).await,
            MealCommands::Delete { id, json } => cmd_meal_delete(&service()?, &id, json).await,
        },
        Commands::Summary { date, json } => cmd_summary(&service()?, date, json).await,
        Commands::History { days, json } => cmd_history(&service()?, days, json).await,
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                json,
            } => cmd_weight_log(&service()?, value, &unit, date, json).await,
            WeightCommands::History { date, json } => {
                cmd_weight_history(&service()?, date, json).await
            }
            WeightCommands::Delete { id, json } => {
                cmd_weight_delete(&service()?, &id, json).await
            }
        },
        Commands::Favourite { command } => match command {
            FavouriteCommands::List { json } => cmd_favourite_list(&service()?, json).await,
            FavouriteCommands::Save { name, meal, json } => {
                cmd_favourite_save(&service()?, &name, meal, json).await
            }
            FavouriteCommands::Log { name, date, json } => {
                cmd_favourite_log(&service()?, &name, date, json).await
            }
            FavouriteCommands::Delete { name, json } => {
                cmd_favourite_delete(&service()?, &name, json).await
            }
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                name,
                ingredients,
                file,
                json,
            } => {
                cmd_recipe_create(
                    &service()?,
                    &ai()?,
                    &name,
                    ingredients,
                    file.as_deref(),
                    json,
                )
                .await
            }
            RecipeCommands::List { json } => cmd_recipe_list(&service()?, json).await,
            RecipeCommands::Show { name, json } => cmd_recipe_show(&service()?, &name, json).await,
            RecipeCommands::Log {
                name,
                grams,
                date,
                json,
            } => cmd_recipe_log(&service()?, &name, grams, date, json).await,
            RecipeCommands::Delete { name, json } => {
                cmd_recipe_delete(&service()?, &name, json).await
            }
        },
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => cmd_settings_show(&service()?, json).await,
            SettingsCommands::Set { args, json } => {
                cmd_settings_set(&service()?, args, json).await
            }
        },
        Commands::Login {
            user,
            server,
            token,
            json,
        } => cmd_login(&config, &user, &server, token, json).await,
        Commands::Logout { json } => cmd_logout(&config, json),
        Commands::Whoami { json } => cmd_whoami(&config, json),
        Commands::Export { output } => cmd_export(&service()?, output.as_deref()).await,
        Commands::Suggest { json } => cmd_suggest(&service()?, &ai()?, json).await,
        Commands::Weekly { json } => cmd_weekly(&service()?, &ai()?, json).await,
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            let docs = Arc::new(SqliteDocumentStore::open(&config.documents_path())?);
            server::start_server(docs, port, &bind, api_key).await
        }
    }
}
