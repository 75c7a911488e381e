//! Tests for config module

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::config::*;
    use crate::error::Error;

    // ========================================================================
    // Defaults
    // ========================================================================

    #[test]
    fn test_config_default_values() {
        // Arrange & Act
        let config = VectorDataConfig::default();

        // Assert
        assert_eq!(config.postgres.schema, "public");
        assert!(config.postgres.ensure_extension);
        assert!(config.postgres.strict_by_default);
        assert_eq!(config.postgres.max_connections, 10);
        assert_eq!(config.mssql.schema, "dbo");
        assert!(config.mssql.server_side_search);
        assert_eq!(config.write.batch_size, 500);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    // ========================================================================
    // TOML parsing
    // ========================================================================

    #[test]
    fn test_config_from_toml_minimal() {
        // Arrange
        let toml_str = r#"
[postgres]
url = "postgres://localhost/vectors"
"#;

        // Act
        let config = VectorDataConfig::from_toml(toml_str).expect("parse");

        // Assert
        assert_eq!(config.postgres.url, "postgres://localhost/vectors");
        assert_eq!(config.postgres.schema, "public");
        assert_eq!(config.write.batch_size, 500);
    }

    #[test]
    fn test_config_from_toml_full() {
        // Arrange
        let toml_str = r#"
[postgres]
url = "postgres://localhost/vectors"
schema = "embeddings"
ensure_extension = false
strict_by_default = false
max_connections = 4

[mssql]
connection_string = "server=tcp:localhost,1433;user=sa;password=secret;TrustServerCertificate=true"
schema = "vec"
server_side_search = false

[write]
batch_size = 200

[logging]
level = "debug"
format = "compact"
"#;

        // Act
        let config = VectorDataConfig::from_toml(toml_str).expect("parse");

        // Assert
        assert_eq!(config.postgres.schema, "embeddings");
        assert!(!config.postgres.ensure_extension);
        assert!(!config.postgres.strict_by_default);
        assert_eq!(config.postgres.max_connections, 4);
        assert_eq!(config.mssql.schema, "vec");
        assert!(!config.mssql.server_side_search);
        assert_eq!(config.write.batch_size, 200);
        assert_eq!(config.logging.format, "compact");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml_wrong_type() {
        let result = VectorDataConfig::from_toml("[write]\nbatch_size = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_load_from_path() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[mssql]\nschema = \"vectors\"").expect("write");

        // Act
        let config = VectorDataConfig::load_from_path(file.path()).expect("load");

        // Assert
        assert_eq!(config.mssql.schema, "vectors");
        assert_eq!(config.postgres.schema, "public");
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        // Arrange
        let dir = tempfile::tempdir().expect("temp dir");

        // Act
        let config =
            VectorDataConfig::load_from_path(dir.path().join("absent.toml")).expect("load");

        // Assert
        assert_eq!(config.write.batch_size, 500);
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_config_validate_success() {
        assert!(VectorDataConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_empty_schema() {
        // Arrange
        let mut config = VectorDataConfig::default();
        config.postgres.schema = "  ".to_string();

        // Act
        let result = config.validate();

        // Assert
        match result {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "postgres.schema"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_config_validate_batch_size_out_of_range() {
        let mut config = VectorDataConfig::default();
        config.write.batch_size = 0;
        assert!(config.validate().is_err());

        config.write.batch_size = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_invalid_log_level() {
        let mut config = VectorDataConfig::default();
        config.logging.level = "verbose".to_string();
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "logging.level"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_config_validate_invalid_log_format() {
        let mut config = VectorDataConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_error_converts_to_crate_error() {
        let err: Error = ConfigError::ParseError("bad".into()).into();
        assert_eq!(err.code(), "VD-010");
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[test]
    fn test_config_roundtrip() {
        // Arrange
        let mut config = VectorDataConfig::default();
        config.mssql.server_side_search = false;
        config.write.batch_size = 64;

        // Act
        let toml_str = config.to_toml().expect("serialize");
        let parsed = VectorDataConfig::from_toml(&toml_str).expect("parse");

        // Assert
        assert!(!parsed.mssql.server_side_search);
        assert_eq!(parsed.write.batch_size, 64);
    }
}
