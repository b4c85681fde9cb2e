pub mod admin;
pub mod handler_api;
pub mod health;
