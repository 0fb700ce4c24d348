pub mod config;
pub mod db;
pub mod errors;
pub mod math;
pub mod models;
pub mod paper;
pub mod state;
pub mod stats;
