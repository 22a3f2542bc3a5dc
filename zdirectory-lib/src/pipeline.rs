//! Directory listing pipeline.
//!
//! Raw profiles are annotated once with referral standing, verification and
//! name-collision counts ([`annotate`]). Every listing is then a pure function
//! of the annotated snapshot, the search text and a single active filter
//! ([`apply`]): filter, sort by name, bucket by first letter.

use crate::model::{Profile, ProfileId};
use crate::normalize::normalize_identity;
use crate::referral::{compute_referral_ranks_top, name_collisions, ReferralStats};
use crate::verification::{classify, Verification};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Ranks `1..=LEADERBOARD_SIZE` count as "top ranked"
pub const LEADERBOARD_SIZE: u32 = 10;

/// Bucket for names without a usable first character
pub const OTHER_BUCKET: &str = "#";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStanding {
    /// Position among the top referrers, if ranked
    pub rank: Option<u32>,
    /// Number of profiles naming this one as referrer
    pub count: u32,
}

/// Profile plus everything derived from the full profile set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedProfile {
    #[serde(flatten)]
    pub profile: Profile,
    pub referral: ReferralStanding,
    pub verification: Verification,
    /// Profiles sharing this normalized name, this one included.
    /// Zero when the name normalizes to nothing.
    pub duplicate_name_count: usize,
}

impl AnnotatedProfile {
    pub fn id(&self) -> ProfileId {
        self.profile.id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// More than one profile uses this name
    pub fn has_duplicate_name(&self) -> bool {
        self.duplicate_name_count > 1
    }
}

/// Derive referral standing, verification and collision counts for every profile
pub fn annotate(profiles: Vec<Profile>, top_n: usize) -> Vec<AnnotatedProfile> {
    let stats: ReferralStats = compute_referral_ranks_top(&profiles, top_n);
    let collisions = name_collisions(&profiles);

    profiles
        .into_iter()
        .map(|profile| {
            let count = stats.count_of(profile.id);
            // Stored rank only stands in when no live referrals were counted
            let stored_rank = (count == 0 && profile.referral_rank > 0)
                .then_some(profile.referral_rank);
            let referral = ReferralStanding {
                rank: stats.rank_of(profile.id).or(stored_rank),
                count,
            };
            let verification = classify(&profile);
            let duplicate_name_count = collisions
                .get(&normalize_identity(&profile.name))
                .copied()
                .unwrap_or(0);

            AnnotatedProfile {
                profile,
                referral,
                verification,
                duplicate_name_count,
            }
        })
        .collect()
}

/// The single active directory filter. Picking one clears the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryFilter {
    #[default]
    #[serde(rename = "none")]
    All,
    Verified,
    Referred,
    Ranked,
    Featured,
}

impl DirectoryFilter {
    /// Radio-button toggle: picking the active filter clears it
    pub fn toggle(self, picked: DirectoryFilter) -> DirectoryFilter {
        if self == picked {
            DirectoryFilter::All
        } else {
            picked
        }
    }

    pub fn matches(self, profile: &AnnotatedProfile, leaderboard_size: u32) -> bool {
        match self {
            DirectoryFilter::All => true,
            DirectoryFilter::Verified => {
                profile.verification.verified_address
                    || profile.verification.verified_link_count > 0
            }
            DirectoryFilter::Referred => profile.profile.has_referrer(),
            DirectoryFilter::Ranked => profile.profile.ranks.is_top(leaderboard_size),
            DirectoryFilter::Featured => profile.profile.featured,
        }
    }
}

impl std::str::FromStr for DirectoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "all" | "" => Ok(DirectoryFilter::All),
            "verified" => Ok(DirectoryFilter::Verified),
            "referred" => Ok(DirectoryFilter::Referred),
            "ranked" => Ok(DirectoryFilter::Ranked),
            "featured" => Ok(DirectoryFilter::Featured),
            other => Err(format!("Invalid directory filter: {}", other)),
        }
    }
}

impl std::fmt::Display for DirectoryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DirectoryFilter::All => "none",
            DirectoryFilter::Verified => "verified",
            DirectoryFilter::Referred => "referred",
            DirectoryFilter::Ranked => "ranked",
            DirectoryFilter::Featured => "featured",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryQuery {
    /// Case-insensitive substring matched against `name` only
    pub search_text: String,
    pub filter: DirectoryFilter,
    pub leaderboard_size: u32,
}

impl Default for DirectoryQuery {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            filter: DirectoryFilter::All,
            leaderboard_size: LEADERBOARD_SIZE,
        }
    }
}

impl DirectoryQuery {
    pub fn new(search_text: impl Into<String>, filter: DirectoryFilter) -> Self {
        Self {
            search_text: search_text.into(),
            filter,
            ..Default::default()
        }
    }
}

/// Filtered, sorted and bucketed listing
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryView<'a> {
    pub sorted: Vec<&'a AnnotatedProfile>,
    pub grouped: BTreeMap<String, Vec<&'a AnnotatedProfile>>,
    pub letters: Vec<String>,
}

impl DirectoryView<'_> {
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

pub fn apply<'a>(profiles: &'a [AnnotatedProfile], query: &DirectoryQuery) -> DirectoryView<'a> {
    let needle = query.search_text.to_lowercase();

    let mut sorted: Vec<&AnnotatedProfile> = profiles
        .iter()
        .filter(|p| p.name().to_lowercase().contains(&needle))
        .filter(|p| query.filter.matches(p, query.leaderboard_size))
        .collect();
    sorted.sort_by_cached_key(|p| (collation_key(p.name()), p.name().to_string(), p.id()));

    let mut grouped: BTreeMap<String, Vec<&AnnotatedProfile>> = BTreeMap::new();
    for &profile in &sorted {
        grouped
            .entry(bucket_key(profile.name()))
            .or_default()
            .push(profile);
    }
    let letters = grouped.keys().cloned().collect();

    DirectoryView {
        sorted,
        grouped,
        letters,
    }
}

/// Upper-cased first character of `name`, or [`OTHER_BUCKET`]
pub fn bucket_key(name: &str) -> String {
    match name.chars().next() {
        Some(first) if !first.is_whitespace() && !first.is_control() => {
            first.to_uppercase().collect()
        }
        _ => OTHER_BUCKET.to_string(),
    }
}

/// Case- and accent-insensitive sort key, so "Éclair" sorts with the e's
pub fn collation_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Featured profiles for the landing carousel.
///
/// Falls back to the first `count` profiles when fewer than `count` are featured.
pub fn featured(profiles: &[AnnotatedProfile], count: usize) -> Vec<&AnnotatedProfile> {
    let picked: Vec<&AnnotatedProfile> = profiles
        .iter()
        .filter(|p| p.profile.featured)
        .take(count)
        .collect();

    if picked.len() >= count {
        picked
    } else {
        profiles.iter().take(count).collect()
    }
}

/// Ranked referrers in rank order. Stored ranks without live referrals are left out.
pub fn top_referrers(profiles: &[AnnotatedProfile]) -> Vec<&AnnotatedProfile> {
    let mut ranked: Vec<&AnnotatedProfile> = profiles
        .iter()
        .filter(|p| p.referral.count > 0 && p.referral.rank.is_some())
        .collect();
    ranked.sort_by_key(|p| p.referral.rank);
    ranked
}
