pub mod api;
pub mod auth;
pub mod image;
pub mod webhook;
