use super::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                static_dir: PathBuf::from("projector"),
            },
            output: OutputConfig {
                root_dir: PathBuf::from("projector"),
                data_dir: PathBuf::from("astra_data"),
                manifest_file: "projector_config.json".to_string(),
            },
            data_api: DataApiConfig {
                timeout_seconds: 45,
            },
            base_dir: PathBuf::new(),
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [server
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let invalid_types = r#"
            [server]
            port = "eighty"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_types);
        assert!(result.is_err());
    }

    #[test]
    fn token_is_never_part_of_config() {
        let config = Config::default();
        let rendered = toml::to_string_pretty(&config).expect("config serializes");
        assert!(!rendered.to_lowercase().contains("token"));
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidHost(String::new()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidTimeout(0),
            ConfigError::InvalidDataDir("../x".to_string()),
            ConfigError::InvalidManifestFile(String::new()),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(message.len() > 10);
        }
    }
}
