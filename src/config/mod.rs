// Configuration management module
// TOML settings for the HTTP server, dataset output layout and Data API client

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, DataApiConfig, OutputConfig, ServerConfig};
