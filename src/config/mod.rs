mod settings;

pub use settings::{DatabaseConfig, LogConfig, OtelConfig, Settings};
