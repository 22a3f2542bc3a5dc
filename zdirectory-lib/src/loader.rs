//! Fetch the full profile set from a [`DataService`].
//!
//! Leaderboards, profile pages and links are requested concurrently. Only a
//! failing profile page fails the load; missing leaderboards or links degrade
//! to empty with a warning.

use crate::config::DirectoryConfig;
use crate::data::{DataService, DataServiceExt, SortOrder};
use crate::model::{count_from_value, LinkRecord, Profile, ProfileId, ProfileRecord};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const PROFILE_TABLE: &str = "zcasher_searchable";
pub const LINK_TABLE: &str = "zcasher_links";

/// Leaderboard views and the rank column each one carries
pub const LEADERBOARDS: [(&str, &str); 3] = [
    ("referrer_ranked_alltime", "rank_alltime"),
    ("referrer_ranked_weekly", "rank_weekly"),
    ("referrer_ranked_monthly", "rank_monthly"),
];

type RankMap = HashMap<ProfileId, u32>;

/// Load every profile with links and leaderboard ranks attached
pub async fn fetch_profiles<S>(service: &S, config: &DirectoryConfig) -> Result<Vec<Profile>>
where
    S: DataService + ?Sized,
{
    let leaderboard_size = config.leaderboard_size as usize;
    let boards = join_all(
        LEADERBOARDS
            .iter()
            .map(|(table, column)| fetch_leaderboard(service, table, column, leaderboard_size)),
    );

    let (boards, rows, mut links) = futures::join!(
        boards,
        fetch_profile_rows(service, config.page_size),
        fetch_links(service)
    );
    let rows = rows?;

    let mut skipped = 0usize;
    let profiles: Vec<Profile> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<ProfileRecord>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                skipped += 1;
                warn!(error = %e, "skipping malformed profile row");
                None
            }
        })
        .map(|mut record| {
            if record.links.is_none() {
                record.links = links.remove(&record.id);
            }
            apply_leaderboards(&mut record, &boards);
            Profile::from_record(record)
        })
        .collect();

    info!(profiles = profiles.len(), skipped, "profiles loaded");
    Ok(profiles)
}

/// A loaded board replaces the row's rank, 0 when the profile is not on it.
/// An unavailable board leaves the row's value.
fn apply_leaderboards(record: &mut ProfileRecord, boards: &[Option<RankMap>]) {
    let id = record.id;
    let slots = [
        &mut record.rank_alltime,
        &mut record.rank_weekly,
        &mut record.rank_monthly,
    ];
    for (slot, board) in slots.into_iter().zip(boards) {
        if let Some(board) = board {
            *slot = board.get(&id).copied().unwrap_or(0);
        }
    }
}

async fn fetch_leaderboard<S>(
    service: &S,
    table: &str,
    column: &str,
    size: usize,
) -> Option<RankMap>
where
    S: DataService + ?Sized,
{
    let response = service
        .from_table(table)
        .select(&format!("referred_by_zcasher_id, {}", column))
        .order(column, SortOrder::Ascending)
        .limit(size)
        .await;

    match response.into_rows() {
        Ok(rows) => Some(
            rows.iter()
                .filter_map(|row| {
                    let id = row.get("referred_by_zcasher_id")?.as_i64()?;
                    let rank = count_from_value(row.get(column)?);
                    (rank > 0).then_some((id, rank))
                })
                .collect(),
        ),
        Err(e) => {
            warn!(table, error = %e, "leaderboard unavailable");
            None
        }
    }
}

/// Page through the profile view until a short page or the reported count
async fn fetch_profile_rows<S>(service: &S, page_size: usize) -> Result<Vec<Value>>
where
    S: DataService + ?Sized,
{
    let page_size = page_size.max(1);
    let mut rows: Vec<Value> = Vec::new();

    loop {
        let from = rows.len();
        let response = service
            .from_table(PROFILE_TABLE)
            .select("*")
            .count_exact()
            .order("name", SortOrder::Ascending)
            .order("id", SortOrder::Ascending)
            .range(from, from + page_size - 1)
            .await;

        let total = response.count;
        let page = response
            .into_rows()
            .with_context(|| format!("Failed to fetch profiles at offset {}", from))?;
        let fetched = page.len();
        debug!(offset = from, rows = fetched, ?total, "fetched profile page");
        rows.extend(page);

        if fetched < page_size || total.map_or(false, |total| rows.len() >= total) {
            break;
        }
    }

    Ok(rows)
}

/// Links grouped by owning profile, in display order
async fn fetch_links<S>(service: &S) -> HashMap<ProfileId, Vec<LinkRecord>>
where
    S: DataService + ?Sized,
{
    let rows = match service.from_table(LINK_TABLE).await.into_rows() {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "links unavailable");
            return HashMap::new();
        }
    };

    let mut by_owner: HashMap<ProfileId, Vec<LinkRecord>> = HashMap::new();
    for row in rows {
        match serde_json::from_value::<LinkRecord>(row) {
            Ok(link) => match link.zcasher_id {
                Some(owner) => by_owner.entry(owner).or_default().push(link),
                None => debug!(link = link.id, "link without an owner ignored"),
            },
            Err(e) => warn!(error = %e, "skipping malformed link row"),
        }
    }
    by_owner
}
