pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod referral;
pub mod search;
pub mod verification;

pub use config::{BackendConfig, DirectoryConfig};
pub use data::{DataService, DataServiceExt, MemoryDataService, PostgresDataService, QueryResponse};
pub use error::DataError;
pub use events::{DirectoryEvent, EventBus, Subscription};
pub use model::{Link, Profile, ProfileId};
pub use normalize::{build_slug, normalize_identity};
pub use pipeline::{AnnotatedProfile, DirectoryFilter, DirectoryQuery, DirectoryView};
pub use verification::TrustTier;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Open the backend described by `backend`
pub async fn connect(backend: &BackendConfig) -> Result<Arc<dyn DataService>> {
    match backend {
        BackendConfig::Mock { fixture: None } => Ok(Arc::new(MemoryDataService::fixture()?)),
        BackendConfig::Mock {
            fixture: Some(path),
        } => Ok(Arc::new(MemoryDataService::from_yaml_file(path).await?)),
        BackendConfig::Postgres { url } => Ok(Arc::new(
            PostgresDataService::connect(url)
                .await
                .context("Failed to open postgres backend")?,
        )),
    }
}

/// Main entry point: a backend plus the last good annotated profile snapshot
pub struct Directory {
    service: Arc<dyn DataService>,
    config: DirectoryConfig,
    profiles: Vec<AnnotatedProfile>,
    events: EventBus,
}

impl Directory {
    /// Create an empty directory over `service`. Call [`Directory::refresh`] to load it.
    pub fn new(service: Arc<dyn DataService>, config: DirectoryConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            service,
            config,
            profiles: Vec::new(),
            events,
        }
    }

    /// Connect to the configured backend and load the first snapshot
    pub async fn open(config: DirectoryConfig) -> Result<Self> {
        info!(backend = %config.backend, "opening directory");
        let service = connect(&config.backend).await?;
        let mut directory = Self::new(service, config);
        directory.refresh().await?;
        Ok(directory)
    }

    /// Reload every profile from the backend.
    ///
    /// On failure the previous snapshot stays in place and a
    /// [`DirectoryEvent::RefreshFailed`] is published.
    pub async fn refresh(&mut self) -> Result<usize> {
        match loader::fetch_profiles(self.service.as_ref(), &self.config).await {
            Ok(profiles) => {
                self.profiles = pipeline::annotate(profiles, self.config.referral_top_n);
                let count = self.profiles.len();
                self.events
                    .publish(DirectoryEvent::ProfilesRefreshed { count });
                Ok(count)
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "refresh failed, keeping previous profiles");
                self.events.publish(DirectoryEvent::RefreshFailed {
                    error: format!("{:#}", e),
                });
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<dyn DataService> {
        &self.service
    }

    pub fn profiles(&self) -> &[AnnotatedProfile] {
        &self.profiles
    }

    /// Query with the configured leaderboard size
    pub fn query(&self, search_text: impl Into<String>, filter: DirectoryFilter) -> DirectoryQuery {
        DirectoryQuery {
            leaderboard_size: self.config.leaderboard_size,
            ..DirectoryQuery::new(search_text, filter)
        }
    }

    /// Filtered, sorted and grouped listing
    pub fn view(&self, query: &DirectoryQuery) -> DirectoryView<'_> {
        pipeline::apply(&self.profiles, query)
    }

    pub fn suggest(&self, input: &str) -> Vec<&AnnotatedProfile> {
        search::suggest(&self.profiles, input)
    }

    pub fn featured(&self) -> Vec<&AnnotatedProfile> {
        pipeline::featured(&self.profiles, self.config.featured_count)
    }

    pub fn top_referrers(&self) -> Vec<&AnnotatedProfile> {
        pipeline::top_referrers(&self.profiles)
    }

    /// Every profile whose name has the same identity key as `name`
    pub fn find_by_name(&self, name: &str) -> Vec<&AnnotatedProfile> {
        let key = normalize_identity(name);
        if key.is_empty() {
            return Vec::new();
        }
        self.profiles
            .iter()
            .filter(|p| normalize_identity(p.name()) == key)
            .collect()
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn request_sign_in(&self) {
        self.events.publish(DirectoryEvent::SignInRequested);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture_directory() -> Directory {
        let service = Arc::new(MemoryDataService::fixture().unwrap());
        let mut directory = Directory::new(service, DirectoryConfig::default());
        directory.refresh().await.unwrap();
        directory
    }

    #[tokio::test]
    async fn test_find_by_name_groups_lookalikes() {
        let directory = fixture_directory().await;

        let found = directory.find_by_name("SAVEZCASH");
        let mut ids: Vec<ProfileId> = found.iter().map(|p| p.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![15, 512]);
        assert!(found.iter().all(|p| p.has_duplicate_name()));

        assert!(directory.find_by_name("!!!").is_empty());
    }

    #[tokio::test]
    async fn test_query_uses_configured_leaderboard() {
        let service = Arc::new(MemoryDataService::new());
        let config = DirectoryConfig {
            leaderboard_size: 3,
            ..Default::default()
        };
        let directory = Directory::new(service, config);
        let query = directory.query("zec", DirectoryFilter::Ranked);
        assert_eq!(query.leaderboard_size, 3);
        assert_eq!(query.search_text, "zec");
    }

    #[tokio::test]
    async fn test_sign_in_request_is_published() {
        let directory = fixture_directory().await;
        let mut events = directory.subscribe();
        directory.request_sign_in();
        assert_eq!(events.next().await, Some(DirectoryEvent::SignInRequested));
    }

    #[tokio::test]
    async fn test_connect_default_backend() {
        let service = connect(&BackendConfig::default()).await.unwrap();
        let response = service.from_table("zcasher").count_exact().limit(1).await;
        assert!(response.count.unwrap_or(0) > 1);
    }
}
