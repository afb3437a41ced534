pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod governor;
pub mod middleware;
pub mod models;
pub mod services;
