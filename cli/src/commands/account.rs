use anyhow::{Context, Result};
use std::sync::Arc;

use nosh_core::cloud::{CloudStore, UserId};
use nosh_core::db::LocalStore;
use nosh_core::migrate::{MigrationOutcome, migrate_local_to_cloud};

use crate::config::{Account, Config};
use crate::remote::HttpDocumentStore;

/// Sign in, then copy guest data into the account if it has none yet.
///
/// The account is saved before the copy starts, so a failed copy leaves the
/// user signed in with whatever was written.
pub(crate) async fn cmd_login(
    config: &Config,
    user: &str,
    server: &str,
    token: Option<String>,
    json: bool,
) -> Result<()> {
    let user = UserId::new(user)?;
    let account = Account {
        user: user.to_string(),
        server: server.trim_end_matches('/').to_string(),
        token,
    };

    let docs = HttpDocumentStore::new(&account.server, account.token.clone())?;
    let cloud = CloudStore::new(Arc::new(docs), user.clone());
    let local = LocalStore::open(&config.db_path)?;

    config.save_account(&account)?;
    tracing::info!(%user, server = %account.server, "signed in");

    let outcome = migrate_local_to_cloud(&local, &cloud)
        .await
        .with_context(|| {
            format!(
                "Signed in as {user}, but copying local data to {} failed",
                account.server
            )
        })?;

    if json {
        let value = match &outcome {
            MigrationOutcome::AlreadyMigrated => {
                serde_json::json!({ "user": user, "migrated": null })
            }
            MigrationOutcome::Copied(summary) => {
                serde_json::json!({ "user": user, "migrated": summary })
            }
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Signed in as {user} on {}", account.server);
    match outcome {
        MigrationOutcome::AlreadyMigrated => {
            println!("Account already has data; local data was left as is.");
        }
        MigrationOutcome::Copied(s) => {
            println!(
                "Copied {} meals, {} favourites, {} weights, {} recipes{}",
                s.meals,
                s.favourites,
                s.weights,
                s.recipes,
                if s.settings { " and settings" } else { "" }
            );
        }
    }
    Ok(())
}

pub(crate) fn cmd_logout(config: &Config, json: bool) -> Result<()> {
    let account = config.load_account()?;
    let signed_out = config.clear_account()?;

    if json {
        println!("{}", serde_json::json!({ "signed_out": signed_out }));
    } else if let Some(account) = account {
        println!("Signed out {}. Back to local guest data.", account.user);
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(config: &Config, json: bool) -> Result<()> {
    let account = config.load_account()?;

    if json {
        let value = match &account {
            Some(a) => serde_json::json!({ "guest": false, "user": a.user, "server": a.server }),
            None => serde_json::json!({ "guest": true, "db_path": config.db_path }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match account {
        Some(a) => println!("{} on {}", a.user, a.server),
        None => println!("Guest (local data in {})", config.db_path.display()),
    }
    Ok(())
}
