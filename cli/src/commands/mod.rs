mod account;
mod advice;
mod chat;
mod export;
mod favourite;
mod helpers;
mod meal;
mod recipe;
mod settings;
mod summary;
mod weight;

pub(crate) use account::{cmd_login, cmd_logout, cmd_whoami};
pub(crate) use advice::{cmd_suggest, cmd_weekly};
pub(crate) use chat::cmd_chat;
pub(crate) use export::cmd_export;
pub(crate) use favourite::{
    cmd_favourite_delete, cmd_favourite_list, cmd_favourite_log, cmd_favourite_save,
};
pub(crate) use meal::{cmd_meal_delete, cmd_meal_edit, cmd_meals};
pub(crate) use recipe::{
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list, cmd_recipe_log, cmd_recipe_show,
};
pub(crate) use settings::{SettingsArgs, cmd_settings_set, cmd_settings_show};
pub(crate) use summary::{cmd_history, cmd_summary};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_log};
