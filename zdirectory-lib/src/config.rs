use crate::pipeline::LEADERBOARD_SIZE;
use crate::referral::DEFAULT_TOP_N;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable that switches the default mock backend to Postgres
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Where profile data comes from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory tables; the bundled demo fixture when no file is given
    Mock {
        #[serde(default)]
        fixture: Option<PathBuf>,
    },
    Postgres { url: String },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Mock { fixture: None }
    }
}

impl BackendConfig {
    /// The mock backend over the bundled fixture
    pub fn is_default_mock(&self) -> bool {
        matches!(self, BackendConfig::Mock { fixture: None })
    }
}

impl std::fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Mock { fixture: None } => write!(f, "mock (bundled fixture)"),
            BackendConfig::Mock {
                fixture: Some(path),
            } => write!(f, "mock ({})", path.display()),
            // Never print credentials
            BackendConfig::Postgres { .. } => write!(f, "postgres"),
        }
    }
}

/// Directory settings, usually read from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DirectoryConfig {
    pub backend: BackendConfig,
    /// Rows per request when paging through profiles
    pub page_size: usize,
    /// How many referrers get a rank
    pub referral_top_n: usize,
    /// Leaderboard ranks `1..=leaderboard_size` count as top ranked
    pub leaderboard_size: u32,
    pub featured_count: usize,
    /// Buffered events per subscriber before it starts skipping
    pub event_capacity: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            page_size: 1000,
            referral_top_n: DEFAULT_TOP_N,
            leaderboard_size: LEADERBOARD_SIZE,
            featured_count: 6,
            event_capacity: 64,
        }
    }
}

impl DirectoryConfig {
    /// Use Postgres at `url` when the backend is still the default mock
    pub fn with_database_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            if self.backend.is_default_mock() {
                self.backend = BackendConfig::Postgres { url };
            }
        }
        self
    }

    /// Apply the `DATABASE_URL` override from the environment
    pub fn with_env(self) -> Self {
        let url = std::env::var(DATABASE_URL_ENV).ok();
        self.with_database_url(url)
    }
}

/// Load and validate a configuration file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<DirectoryConfig> {
    let content = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
}

/// Parse and validate configuration from a YAML string
pub fn parse_config_str(content: &str) -> Result<DirectoryConfig> {
    // An empty document means all defaults
    if content.trim().is_empty() {
        return Ok(DirectoryConfig::default());
    }

    let config: DirectoryConfig =
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML content")?;

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &DirectoryConfig) -> Result<()> {
    if config.page_size == 0 {
        anyhow::bail!("page_size must be at least 1");
    }
    if config.referral_top_n == 0 {
        anyhow::bail!("referral_top_n must be at least 1");
    }
    if config.leaderboard_size == 0 {
        anyhow::bail!("leaderboard_size must be at least 1");
    }
    if config.event_capacity == 0 {
        anyhow::bail!("event_capacity must be at least 1");
    }
    if let BackendConfig::Postgres { url } = &config.backend {
        if url.trim().is_empty() {
            anyhow::bail!("postgres backend requires a non-empty url");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config, DirectoryConfig::default());
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.referral_top_n, 10);
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.featured_count, 6);
        assert!(config.backend.is_default_mock());
    }

    #[test]
    fn test_parse_backends() {
        let config = parse_config_str(
            r#"
backend:
  kind: postgres
  url: postgresql://localhost/zcashme
page_size: 250
"#,
        )
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Postgres {
                url: "postgresql://localhost/zcashme".to_string()
            }
        );
        assert_eq!(config.page_size, 250);
        assert_eq!(config.featured_count, 6);

        let config = parse_config_str(
            r#"
backend:
  kind: mock
  fixture: ./tables.yaml
"#,
        )
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Mock {
                fixture: Some(PathBuf::from("./tables.yaml"))
            }
        );
    }

    #[test]
    fn test_validation_errors() {
        let err = parse_config_str("page_size: 0").unwrap_err();
        assert!(err.to_string().contains("page_size"));

        let err = parse_config_str("backend:\n  kind: postgres\n  url: ' '").unwrap_err();
        assert!(err.to_string().contains("url"));

        assert!(parse_config_str("backend:\n  kind: sqlite").is_err());
    }

    #[test]
    fn test_database_url_override() {
        let config = DirectoryConfig::default()
            .with_database_url(Some("postgresql://db/zcashme".to_string()));
        assert!(matches!(config.backend, BackendConfig::Postgres { .. }));

        // An explicit fixture is not replaced
        let explicit = DirectoryConfig {
            backend: BackendConfig::Mock {
                fixture: Some(PathBuf::from("t.yaml")),
            },
            ..Default::default()
        };
        let config = explicit
            .clone()
            .with_database_url(Some("postgresql://db/zcashme".to_string()));
        assert_eq!(config, explicit);

        let config = DirectoryConfig::default().with_database_url(Some("  ".to_string()));
        assert!(config.backend.is_default_mock());
    }

    #[test]
    fn test_backend_display_hides_url() {
        let backend = BackendConfig::Postgres {
            url: "postgresql://user:secret@db/zcashme".to_string(),
        };
        assert_eq!(backend.to_string(), "postgres");
    }
}
