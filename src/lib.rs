//! Casabricks listing backend
//!
//! Property image management with AI enhancement: operators upload listing
//! photos to R2, submit them to an external enhancement service, and receive
//! signed completion webhooks. A background worker times out images the
//! service never called back about.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
