use anyhow::{Result, bail};
use clap::Args;

use nosh_core::models::{SettingsPatch, UserSettings, validate_weight_kg};
use nosh_core::service::NoshService;

use super::helpers::user_error;

#[derive(Args)]
pub(crate) struct SettingsArgs {
    /// Gemini API key (empty string to clear)
    #[arg(long)]
    api_key: Option<String>,
    /// Daily calorie goal (kcal)
    #[arg(long)]
    calories: Option<i64>,
    /// Daily protein goal (g)
    #[arg(long)]
    protein: Option<i64>,
    /// Daily carbs goal (g)
    #[arg(long)]
    carbs: Option<i64>,
    /// Daily fat goal (g)
    #[arg(long)]
    fat: Option<i64>,
    /// Grams in one of your bowls
    #[arg(long)]
    bowl: Option<i64>,
    /// Grams on one of your plates
    #[arg(long)]
    plate: Option<i64>,
    /// Millilitres in one of your glasses
    #[arg(long)]
    glass: Option<i64>,
    /// Grams on one of your spoons
    #[arg(long)]
    spoon: Option<i64>,
    /// Age in years
    #[arg(long)]
    age: Option<i64>,
    /// Height in cm
    #[arg(long)]
    height: Option<f64>,
    /// Body weight in kg
    #[arg(long)]
    weight: Option<f64>,
}

impl SettingsArgs {
    fn into_patch(self) -> Result<SettingsPatch> {
        for (label, value) in [
            ("calories", self.calories),
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("bowl", self.bowl),
            ("plate", self.plate),
            ("glass", self.glass),
            ("spoon", self.spoon),
        ] {
            if value.is_some_and(|v| v < 0) {
                bail!("--{label} must not be negative");
            }
        }
        if let Some(kg) = self.weight {
            validate_weight_kg(kg)?;
        }
        if self.age.is_some_and(|years| !(1..=150).contains(&years)) {
            bail!("--age must be between 1 and 150");
        }
        if self
            .height
            .is_some_and(|cm| !cm.is_finite() || cm <= 0.0 || cm >= 300.0)
        {
            bail!("--height must be between 0 and 300 cm");
        }

        let patch = SettingsPatch {
            api_key: self.api_key.map(|k| k.trim().to_string()),
            calorie_goal: self.calories,
            protein_goal: self.protein,
            carbs_goal: self.carbs,
            fat_goal: self.fat,
            bowl_g: self.bowl,
            plate_g: self.plate,
            glass_ml: self.glass,
            spoon_g: self.spoon,
            age: self.age,
            weight_kg: self.weight,
            height_cm: self.height,
        };
        if patch.is_empty() {
            bail!("Nothing to update. Pass at least one setting, e.g. --calories 1800");
        }
        Ok(patch)
    }
}

fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

fn print_settings(s: &UserSettings) {
    let key = s.api_key().map_or_else(|| "(not set)".to_string(), mask_key);
    println!("  API key:   {key}");
    println!(
        "  Goals:     {} kcal | P:{}g C:{}g F:{}g",
        s.calorie_goal, s.protein_goal, s.carbs_goal, s.fat_goal
    );
    println!(
        "  Portions:  bowl {}g | plate {}g | glass {}ml | spoon {}g",
        s.bowl_g, s.plate_g, s.glass_ml, s.spoon_g
    );
    let age = s.age.map_or_else(|| "-".to_string(), |a| a.to_string());
    let weight = s.weight_kg.map_or_else(|| "-".to_string(), |w| format!("{w:.1} kg"));
    let height = s.height_cm.map_or_else(|| "-".to_string(), |h| format!("{h:.0} cm"));
    println!("  Profile:   age {age} | weight {weight} | height {height}");
}

/// Settings as JSON, with the API key replaced by whether one is set.
fn settings_json(s: &UserSettings) -> serde_json::Value {
    let mut value = serde_json::to_value(s).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("api_key");
        obj.insert(
            "api_key_set".to_string(),
            serde_json::Value::Bool(s.api_key().is_some()),
        );
    }
    value
}

pub(crate) async fn cmd_settings_show(service: &NoshService, json: bool) -> Result<()> {
    let settings = service.settings().await.map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings_json(&settings))?);
    } else {
        print_settings(&settings);
    }
    Ok(())
}

pub(crate) async fn cmd_settings_set(
    service: &NoshService,
    args: SettingsArgs,
    json: bool,
) -> Result<()> {
    let patch = args.into_patch()?;
    let settings = service
        .update_settings(&patch)
        .await
        .map_err(user_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings_json(&settings))?);
    } else {
        println!("Settings updated");
        print_settings(&settings);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> SettingsArgs {
        SettingsArgs {
            api_key: None,
            calories: None,
            protein: None,
            carbs: None,
            fat: None,
            bowl: None,
            plate: None,
            glass: None,
            spoon: None,
            age: None,
            height: None,
            weight: None,
        }
    }

    #[test]
    fn test_into_patch_maps_fields() {
        let patch = SettingsArgs {
            calories: Some(1800),
            bowl: Some(350),
            api_key: Some("  key  ".to_string()),
            ..empty_args()
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.calorie_goal, Some(1800));
        assert_eq!(patch.bowl_g, Some(350));
        assert_eq!(patch.api_key.as_deref(), Some("key"));
        assert!(patch.fat_goal.is_none());
    }

    #[test]
    fn test_into_patch_rejects_empty_and_invalid() {
        assert!(empty_args().into_patch().is_err());
        assert!(
            SettingsArgs {
                protein: Some(-1),
                ..empty_args()
            }
            .into_patch()
            .is_err()
        );
        assert!(
            SettingsArgs {
                weight: Some(0.0),
                ..empty_args()
            }
            .into_patch()
            .is_err()
        );
        assert!(
            SettingsArgs {
                age: Some(0),
                ..empty_args()
            }
            .into_patch()
            .is_err()
        );
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("abcdef123456"), "****3456");
        assert_eq!(mask_key("ab"), "****ab");
    }

    #[test]
    fn test_settings_json_hides_key() {
        let settings = UserSettings {
            api_key: Some("secret".to_string()),
            ..UserSettings::default()
        };
        let value = settings_json(&settings);
        assert!(value.get("api_key").is_none());
        assert_eq!(value["api_key_set"], true);
        assert_eq!(value["calorie_goal"], 2000);
    }
}
