use anyhow::Context;
use config::{Config, Environment};
use serde::Deserialize;

const DEV_SECRET: &str = "booktracker-dev-secret";
const DEFAULT_UPLOAD_LIMIT_BYTES: i64 = 32 * 1024 * 1024;

/// Server settings read from environment variables, e.g. `DB_HOST` sets `db_host`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub use_in_memory_db: bool,
    pub db_host: String,
    pub db_username: String,
    pub db_password: String,
    pub secret: Option<String>,
    pub uploads_dir: String,
    /// Largest accepted cover or PDF upload
    pub upload_limit_bytes: usize,
    pub port: u16,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_environment(Environment::default())
    }

    fn from_environment(environment: Environment) -> anyhow::Result<Self> {
        Config::builder()
            .set_default("use_in_memory_db", false)?
            .set_default("db_host", "127.0.0.1")?
            .set_default("db_username", "postgres")?
            .set_default("db_password", "postgres")?
            .set_default("uploads_dir", "uploads")?
            .set_default("upload_limit_bytes", DEFAULT_UPLOAD_LIMIT_BYTES)?
            .set_default("port", 8000)?
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Signing secret for session tokens.
    /// Only the in-memory setup may run without one.
    pub fn token_secret(&self) -> anyhow::Result<String> {
        match &self.secret {
            Some(secret) if !secret.is_empty() => Ok(secret.clone()),
            _ if self.use_in_memory_db => {
                tracing::warn!("SECRET not set, using development secret");
                Ok(DEV_SECRET.to_string())
            }
            _ => anyhow::bail!("SECRET has to be set when running with postgres"),
        }
    }
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let source: config::Map<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Environment::default().source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_environment(environment(&[])).unwrap();
        assert_eq!(
            settings,
            Settings {
                use_in_memory_db: false,
                db_host: "127.0.0.1".to_string(),
                db_username: "postgres".to_string(),
                db_password: "postgres".to_string(),
                secret: None,
                uploads_dir: "uploads".to_string(),
                upload_limit_bytes: 32 * 1024 * 1024,
                port: 8000,
            }
        );
        assert!(settings.token_secret().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_environment(environment(&[
            ("USE_IN_MEMORY_DB", "true"),
            ("DB_HOST", "db-master"),
            ("SECRET", "s3cr3t"),
            ("UPLOADS_DIR", "/var/lib/booktracker"),
            ("UPLOAD_LIMIT_BYTES", "1048576"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert!(settings.use_in_memory_db);
        assert_eq!(settings.db_host, "db-master");
        assert_eq!(settings.uploads_dir, "/var/lib/booktracker");
        assert_eq!(settings.upload_limit_bytes, 1024 * 1024);
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.token_secret().unwrap(), "s3cr3t");
    }

    #[test]
    fn test_in_memory_falls_back_to_dev_secret() {
        let settings =
            Settings::from_environment(environment(&[("USE_IN_MEMORY_DB", "true")])).unwrap();
        assert_eq!(settings.token_secret().unwrap(), DEV_SECRET);
    }
}
