use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use zdirectory::data::Query;
use zdirectory::loader::{fetch_profiles, PROFILE_TABLE};
use zdirectory::*;

/// Fixture service that can be told to fail some tables and counts profile page requests
struct ScriptedService {
    inner: MemoryDataService,
    fail_profiles: AtomicBool,
    fail_leaderboards: AtomicBool,
    profile_pages: AtomicUsize,
}

impl ScriptedService {
    fn new() -> Self {
        Self {
            inner: MemoryDataService::fixture().unwrap(),
            fail_profiles: AtomicBool::new(false),
            fail_leaderboards: AtomicBool::new(false),
            profile_pages: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DataService for ScriptedService {
    async fn execute(&self, query: Query) -> QueryResponse {
        if query.table == PROFILE_TABLE {
            self.profile_pages.fetch_add(1, Ordering::SeqCst);
            if self.fail_profiles.load(Ordering::SeqCst) {
                return QueryResponse::failed(DataError::Connection("backend down".to_string()));
            }
        }
        if query.table.starts_with("referrer_ranked_") && self.fail_leaderboards.load(Ordering::SeqCst)
        {
            return QueryResponse::failed(DataError::Query("view missing".to_string()));
        }
        self.inner.execute(query).await
    }
}

async fn fixture_directory() -> Directory {
    let service = Arc::new(MemoryDataService::fixture().unwrap());
    let mut directory = Directory::new(service, DirectoryConfig::default());
    directory.refresh().await.unwrap();
    directory
}

fn ids(profiles: &[&AnnotatedProfile]) -> Vec<ProfileId> {
    profiles.iter().map(|p| p.id()).collect()
}

#[tokio::test]
async fn test_fixture_loads_with_links_and_ranks() {
    let service = MemoryDataService::fixture().unwrap();
    let profiles = fetch_profiles(&service, &DirectoryConfig::default())
        .await
        .unwrap();
    assert_eq!(profiles.len(), 8);

    let tony = profiles.iter().find(|p| p.id == 159).unwrap();
    assert_eq!(tony.links.len(), 2);
    assert_eq!(tony.links[0].url, "https://x.com/tonymargarit");
    assert_eq!(tony.location, None);

    // Leaderboard views override the row's own rank columns
    let yoshi = profiles.iter().find(|p| p.id == 62).unwrap();
    assert_eq!(yoshi.ranks.alltime, 2);
    assert_eq!(yoshi.ranks.weekly, 2);
    assert_eq!(yoshi.ranks.daily, 1);

    let save = profiles.iter().find(|p| p.id == 15).unwrap();
    assert!(save.joined_at.is_some());
    assert_eq!(
        save.location.as_ref().and_then(|l| l.city.as_deref()),
        Some("Los Angeles")
    );
}

#[tokio::test]
async fn test_pagination_follows_count() {
    let service = ScriptedService::new();
    let config = DirectoryConfig {
        page_size: 3,
        ..Default::default()
    };
    let profiles = fetch_profiles(&service, &config).await.unwrap();
    assert_eq!(profiles.len(), 8);
    assert_eq!(service.profile_pages.load(Ordering::SeqCst), 3);

    let service = ScriptedService::new();
    let config = DirectoryConfig {
        page_size: 4,
        ..Default::default()
    };
    let profiles = fetch_profiles(&service, &config).await.unwrap();
    assert_eq!(profiles.len(), 8);
    // The second page fills the reported count, so no empty third request
    assert_eq!(service.profile_pages.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_leaderboards_degrade() {
    let service = ScriptedService::new();
    service.fail_leaderboards.store(true, Ordering::SeqCst);

    let profiles = fetch_profiles(&service, &DirectoryConfig::default())
        .await
        .unwrap();
    let yoshi = profiles.iter().find(|p| p.id == 62).unwrap();
    assert_eq!(yoshi.ranks.alltime, 0);
    let save = profiles.iter().find(|p| p.id == 15).unwrap();
    assert_eq!(save.ranks.alltime, 1);
}

#[tokio::test]
async fn test_referral_ranks_from_fixture() {
    let directory = fixture_directory().await;

    // "Save Zcash" normalizes to save_zcash and resolves to nobody
    assert_eq!(ids(&directory.top_referrers()), vec![15, 62, 221]);

    let save = directory.profiles().iter().find(|p| p.id() == 15).unwrap();
    assert_eq!(save.referral.count, 2);
    assert_eq!(save.referral.rank, Some(1));

    // The impostor shares the name but never receives referrals
    let impostor = directory.profiles().iter().find(|p| p.id() == 512).unwrap();
    assert_eq!(impostor.referral.count, 0);
    assert_eq!(impostor.referral.rank, None);
    assert!(impostor.has_duplicate_name());
    assert_eq!(impostor.verification.trust_tier, TrustTier::Unverified);
}

#[tokio::test]
async fn test_directory_listing() {
    let directory = fixture_directory().await;

    let view = directory.view(&directory.query("", DirectoryFilter::All));
    assert_eq!(view.len(), 8);
    assert_eq!(ids(&view.sorted), vec![221, 475, 445, 15, 512, 159, 62, 415]);
    assert_eq!(view.letters, vec!["A", "B", "F", "S", "T", "Y", "Z"]);
    assert_eq!(ids(&view.grouped["S"]), vec![15, 512]);

    let view = directory.view(&directory.query("zec", DirectoryFilter::All));
    assert_eq!(ids(&view.sorted), vec![415]);

    let view = directory.view(&directory.query("", DirectoryFilter::Verified));
    assert_eq!(view.len(), 7);
    assert!(!ids(&view.sorted).contains(&512));

    let view = directory.view(&directory.query("", DirectoryFilter::Referred));
    assert_eq!(view.len(), 6);

    let view = directory.view(&directory.query("", DirectoryFilter::Ranked));
    assert_eq!(ids(&view.sorted), vec![221, 15, 62]);

    let view = directory.view(&directory.query("", DirectoryFilter::Featured));
    assert_eq!(ids(&view.sorted), vec![221, 445, 159, 62, 415]);
}

#[tokio::test]
async fn test_featured_falls_back_to_first_profiles() {
    let directory = fixture_directory().await;
    // Only five profiles are featured, so the carousel shows the first six loaded
    let featured = directory.featured();
    assert_eq!(featured.len(), 6);
    assert_eq!(ids(&featured), vec![221, 15, 159, 415, 475, 445]);
}

#[tokio::test]
async fn test_suggestions() {
    let directory = fixture_directory().await;
    assert_eq!(ids(&directory.suggest("safe")), vec![15]);
    assert_eq!(ids(&directory.suggest("https://x.com/thefrankbraun")), vec![445]);
    assert!(directory.suggest("").is_empty());
}

#[tokio::test]
async fn test_failed_refresh_keeps_snapshot() {
    let service = Arc::new(ScriptedService::new());
    let mut directory = Directory::new(service.clone(), DirectoryConfig::default());
    let mut events = directory.subscribe();

    assert_eq!(directory.refresh().await.unwrap(), 8);
    assert_eq!(
        events.next().await,
        Some(DirectoryEvent::ProfilesRefreshed { count: 8 })
    );

    service.fail_profiles.store(true, Ordering::SeqCst);
    let err = directory.refresh().await.unwrap_err();
    assert!(format!("{:#}", err).contains("backend down"));
    assert_eq!(directory.profiles().len(), 8);

    match events.next().await {
        Some(DirectoryEvent::RefreshFailed { error }) => assert!(error.contains("backend down")),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_open_with_fixture_file() {
    let path = std::env::temp_dir().join(format!("zdirectory-fixture-{}.yaml", std::process::id()));
    tokio::fs::write(
        &path,
        r#"
aliases:
  zcasher_searchable: zcasher
tables:
  zcasher:
    - { id: 1, name: alice, address_verified: true }
    - { id: 2, name: bob, referred_by: Alice }
"#,
    )
    .await
    .unwrap();

    let config = DirectoryConfig {
        backend: BackendConfig::Mock {
            fixture: Some(path.clone()),
        },
        ..Default::default()
    };
    let directory = Directory::open(config).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(directory.profiles().len(), 2);
    assert_eq!(ids(&directory.top_referrers()), vec![1]);
    // No leaderboard or link tables: nothing is ranked, nothing fails
    let view = directory.view(&directory.query("", DirectoryFilter::Ranked));
    assert!(view.is_empty());
}

#[tokio::test]
async fn test_builder_against_fixture() {
    let service = MemoryDataService::fixture().unwrap();
    let response = service
        .from_table("zcasher")
        .select("id, name")
        .ilike("name", "%zcash%")
        .order("id", data::SortOrder::Descending)
        .await;
    let rows = response.into_rows().unwrap();
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, vec!["savezcash", "SaveZcash"]);
}
