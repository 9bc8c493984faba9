pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application};
