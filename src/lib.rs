pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod grading;
pub mod models;
pub mod rules;
pub mod store;

pub use engine::recalculate;
pub use models::RecalcOutcome;
