//! Configuration loading.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::Path;
use vellum_core::config::AppConfig;

/// Prefix of environment overrides, e.g. `VELLUM_DATABASE__PATH`.
pub const ENV_PREFIX: &str = "VELLUM_";

/// Load configuration from an optional TOML file merged with `VELLUM_` env vars.
///
/// A missing file is not an error; defaults and env vars still apply.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
    let path = path.as_ref();
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use vellum_core::config::{DatabaseConfig, LogFormat};

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = load_config("missing.toml")?;
            assert_eq!(config.server.bind, "127.0.0.1:8080");
            assert_eq!(config.limits.max_batch_size, 100);
            assert!(config.admin.is_none());
            assert!(matches!(config.database, DatabaseConfig::Sqlite { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "server.toml",
                r#"
                [server]
                bind = "0.0.0.0:9000"

                [database]
                type = "postgres"
                url = "postgres://vellum@localhost/vellum"

                [limits]
                max_batch_size = 50

                [logging]
                format = "json"
                "#,
            )?;
            jail.set_env("VELLUM_LIMITS__MAX_BATCH_SIZE", "10");
            jail.set_env("VELLUM_ADMIN__USERNAME", "ops");
            jail.set_env("VELLUM_ADMIN__PASSWORD", "hunter2");

            let config = load_config("server.toml")?;
            assert_eq!(config.server.bind, "0.0.0.0:9000");
            assert_eq!(config.limits.max_batch_size, 10);
            assert_eq!(config.logging.format, LogFormat::Json);
            match &config.database {
                DatabaseConfig::Postgres {
                    url,
                    max_connections,
                    ..
                } => {
                    assert_eq!(url.as_deref(), Some("postgres://vellum@localhost/vellum"));
                    assert_eq!(*max_connections, 25);
                }
                other => panic!("unexpected database config: {other:?}"),
            }
            let admin = config.admin.as_ref().expect("admin from env");
            assert_eq!(admin.username, "ops");
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        Jail::expect_with(|jail| {
            jail.set_env("VELLUM_LIMITS__MAX_BATCH_SIZE", "lots");
            assert!(load_config("server.toml").is_err());
            Ok(())
        });
    }
}
