use anyhow::{Context, Result};
use std::path::Path;

use nosh_core::service::NoshService;

use super::helpers::user_error;

pub(crate) async fn cmd_export(service: &NoshService, output: Option<&Path>) -> Result<()> {
    let data = service.export_meals().await.map_err(user_error)?;
    let body = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} meals to {}", data.meals.len(), path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}
