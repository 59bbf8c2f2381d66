/// Database connection and schema creation
pub mod database;

/// Settings loading from config.toml and the environment
pub mod settings;

pub use settings::{Settings, load_app_settings};
