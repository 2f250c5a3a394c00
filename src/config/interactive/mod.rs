#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::PathBuf;

use super::{Config, ConfigError, DataApiConfig, OutputConfig, ServerConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Astra Projector Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Server").bold().yellow());
    eprintln!("Where the visualizer and its helper API are served.");
    eprintln!();
    configure_server(&mut config.server)?;

    eprintln!();
    eprintln!("{}", style("Dataset Output").bold().yellow());
    eprintln!("Where vector and metadata files and the projector config are written.");
    eprintln!();
    configure_output(&mut config.output)?;

    eprintln!();
    eprintln!("{}", style("Data API").bold().yellow());
    configure_data_api(&mut config.data_api)?;

    eprintln!();
    let layout = config.dataset_layout();
    eprintln!(
        "Datasets will be written to: {}",
        style(layout.data_dir().display()).cyan()
    );
    eprintln!(
        "Projector config: {}",
        style(layout.manifest_path().display()).cyan()
    );
    eprintln!(
        "{}",
        style("Application tokens are never stored; pass them per command or via ASTRA_DB_APPLICATION_TOKEN.").dim()
    );

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Server Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.server.host).cyan());
    eprintln!("  Port: {}", style(config.server.port).cyan());
    eprintln!(
        "  Static Directory: {}",
        style(config.server.static_dir.display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Output Settings:").bold().yellow());
    let layout = config.dataset_layout();
    eprintln!("  Root: {}", style(layout.root_dir().display()).cyan());
    eprintln!("  Datasets: {}", style(layout.data_dir().display()).cyan());
    eprintln!(
        "  Projector Config: {}",
        style(layout.manifest_path().display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Data API Settings:").bold().yellow());
    eprintln!(
        "  Request Timeout: {}s",
        style(config.data_api.timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let dir = Config::default_dir().context("Failed to locate configuration directory")?;
    Config::load(&dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("Existing configuration is unreadable. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: dir.clone(),
                ..Config::default()
            })
        },
        |config| {
            if config.config_file_path().exists() {
                eprintln!("{}", style("Found existing configuration.").green());
            } else {
                eprintln!(
                    "{}",
                    style("No existing configuration found. Using defaults.").yellow()
                );
            }
            Ok(config)
        },
    )
}

fn configure_server(server: &mut ServerConfig) -> Result<()> {
    let host: String = Input::new()
        .with_prompt("Listen host")
        .default(server.host.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Host cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Listen port")
        .default(server.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let static_dir: String = Input::new()
        .with_prompt("Visualizer static directory")
        .default(server.static_dir.display().to_string())
        .interact_text()?;

    server.set_host(host)?;
    server.set_port(port)?;
    server.static_dir = PathBuf::from(static_dir);

    Ok(())
}

fn configure_output(output: &mut OutputConfig) -> Result<()> {
    let root_dir: String = Input::new()
        .with_prompt("Projector root directory")
        .default(output.root_dir.display().to_string())
        .interact_text()?;

    let data_dir: String = Input::new()
        .with_prompt("Dataset directory (relative to root)")
        .default(output.data_dir.display().to_string())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            check_data_dir(input)
        })
        .interact_text()?;

    output.root_dir = PathBuf::from(root_dir);
    output.set_data_dir(PathBuf::from(data_dir))?;

    Ok(())
}

fn configure_data_api(data_api: &mut DataApiConfig) -> Result<()> {
    let timeout: u64 = Input::new()
        .with_prompt("Request timeout in seconds")
        .default(data_api.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), ConfigError> {
            DataApiConfig {
                timeout_seconds: *input,
            }
            .validate()
        })
        .interact_text()?;

    data_api.set_timeout_seconds(timeout)?;
    Ok(())
}

fn check_data_dir(input: &str) -> Result<(), ConfigError> {
    OutputConfig {
        data_dir: PathBuf::from(input),
        ..OutputConfig::default()
    }
    .validate()
}
