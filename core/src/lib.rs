//! Core of the nosh meal logger.
//!
//! Guests keep their data in a local SQLite file ([`db::LocalStore`]); signed-in
//! users keep it in a document store ([`cloud::CloudStore`]). A
//! [`session::Session`] picks one for the current auth state, and
//! [`service::NoshService`] runs the application on top of it.

pub mod cloud;
pub mod db;
pub mod error;
pub mod gemini;
pub mod intent;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod service;
pub mod session;
pub mod store;
