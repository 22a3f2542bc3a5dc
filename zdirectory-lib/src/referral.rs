use crate::model::{Profile, ProfileId};
use crate::normalize::normalize_identity;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Number of referrers that receive a rank
pub const DEFAULT_TOP_N: usize = 10;

/// Referral counts and ranks keyed by profile id.
///
/// Only profiles with at least one resolved referral appear in either map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferralStats {
    pub rank_by_id: HashMap<ProfileId, u32>,
    pub count_by_id: HashMap<ProfileId, u32>,
}

impl ReferralStats {
    pub fn rank_of(&self, id: ProfileId) -> Option<u32> {
        self.rank_by_id.get(&id).copied()
    }

    pub fn count_of(&self, id: ProfileId) -> u32 {
        self.count_by_id.get(&id).copied().unwrap_or(0)
    }

    /// Ranked profile ids in rank order
    pub fn ranked_ids(&self) -> Vec<ProfileId> {
        let mut ranked: Vec<(u32, ProfileId)> = self
            .rank_by_id
            .iter()
            .map(|(&id, &rank)| (rank, id))
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, id)| id).collect()
    }
}

/// Map every non-empty normalized name and slug to a profile id.
///
/// When several profiles share a key the lowest id owns it.
pub fn identity_lookup(profiles: &[Profile]) -> HashMap<String, ProfileId> {
    let mut lookup: HashMap<String, ProfileId> = HashMap::new();

    for profile in profiles {
        let keys = std::iter::once(profile.name.as_str()).chain(profile.slug.as_deref());
        for key in keys.map(normalize_identity).filter(|key| !key.is_empty()) {
            lookup
                .entry(key)
                .and_modify(|owner| *owner = (*owner).min(profile.id))
                .or_insert(profile.id);
        }
    }

    lookup
}

/// Count referrals per profile and rank the top [`DEFAULT_TOP_N`] referrers
pub fn compute_referral_ranks(profiles: &[Profile]) -> ReferralStats {
    compute_referral_ranks_top(profiles, DEFAULT_TOP_N)
}

/// Count referrals per profile and rank the first `top_n` referrers.
///
/// Ordering is count descending, then earlier join time (missing last), then
/// normalized name, then id. Referrers that resolve to no known identity are
/// ignored.
pub fn compute_referral_ranks_top(profiles: &[Profile], top_n: usize) -> ReferralStats {
    let lookup = identity_lookup(profiles);

    let mut count_by_id: HashMap<ProfileId, u32> = HashMap::new();
    for profile in profiles {
        let Some(referrer) = profile.referred_by.as_deref() else {
            continue;
        };
        let key = normalize_identity(referrer);
        if key.is_empty() {
            continue;
        }
        if let Some(&target) = lookup.get(&key) {
            *count_by_id.entry(target).or_insert(0) += 1;
        }
    }

    let by_id: HashMap<ProfileId, &Profile> =
        profiles.iter().map(|profile| (profile.id, profile)).collect();

    let mut candidates: Vec<(ProfileId, u32)> =
        count_by_id.iter().map(|(&id, &count)| (id, count)).collect();
    candidates.sort_by_cached_key(|&(id, count)| {
        let profile = by_id.get(&id);
        let joined_at = profile.and_then(|p| p.joined_at);
        let name_key = profile
            .map(|p| normalize_identity(&p.name))
            .unwrap_or_default();
        (Reverse(count), joined_at.is_none(), joined_at, name_key, id)
    });

    let rank_by_id = candidates
        .iter()
        .take(top_n)
        .enumerate()
        .map(|(index, &(id, _))| (id, index as u32 + 1))
        .collect();

    ReferralStats {
        rank_by_id,
        count_by_id,
    }
}

/// Number of profiles per non-empty normalized name.
///
/// A count above one is the impersonation-risk state: the profiles stay
/// distinct, only this statistic groups them.
pub fn name_collisions(profiles: &[Profile]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for profile in profiles {
        let key = normalize_identity(&profile.name);
        if !key.is_empty() {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;

    fn profile(id: ProfileId, name: &str, referred_by: Option<&str>) -> Profile {
        Profile {
            referred_by: referred_by.map(str::to_string),
            ..Profile::new(id, name)
        }
    }

    fn joined(mut profile: Profile, ts: &str) -> Profile {
        profile.joined_at = parse_timestamp(ts);
        profile
    }

    #[test]
    fn test_referrals_resolve_case_insensitively() {
        let profiles = vec![
            profile(1, "Alice", None),
            profile(2, "Bob", Some("Alice")),
            profile(3, "Carol", Some("alice")),
        ];

        let stats = compute_referral_ranks(&profiles);
        assert_eq!(stats.count_of(1), 2);
        assert_eq!(stats.rank_of(1), Some(1));
        assert_eq!(stats.count_of(2), 0);
        assert_eq!(stats.count_of(3), 0);
        assert_eq!(stats.rank_of(2), None);
        assert_eq!(stats.rank_of(3), None);
    }

    #[test]
    fn test_unresolved_and_empty_referrers_are_ignored() {
        let profiles = vec![
            profile(1, "", None),
            profile(2, "!!!", None),
            profile(3, "Dave", Some("   ")),
            profile(4, "Erin", Some("???")),
            profile(5, "Faye", Some("nobody_here")),
        ];

        let stats = compute_referral_ranks(&profiles);
        assert!(stats.count_by_id.is_empty());
        assert!(stats.rank_by_id.is_empty());
    }

    #[test]
    fn test_slug_resolves_referrer() {
        let mut target = profile(1, "Save Zcash", None);
        target.slug = Some("savezec".to_string());
        let profiles = vec![
            target,
            profile(2, "b", Some("SaveZec")),
            profile(3, "c", Some("save zcash")),
        ];

        let stats = compute_referral_ranks(&profiles);
        assert_eq!(stats.count_of(1), 2);
    }

    #[test]
    fn test_duplicate_identity_lowest_id_wins() {
        let profiles = vec![
            profile(9, "alice", None),
            profile(4, "ALICE", None),
            profile(5, "bob", Some("Alice")),
        ];

        let stats = compute_referral_ranks(&profiles);
        assert_eq!(stats.count_of(4), 1);
        assert_eq!(stats.count_of(9), 0);
    }

    #[test]
    fn test_tie_break_by_join_time_then_name() {
        let profiles = vec![
            joined(profile(1, "zed", None), "2025-10-02 00:00:00+00"),
            joined(profile(2, "amy", None), "2025-10-03 00:00:00+00"),
            profile(3, "bea", None),
            profile(4, "abe", None),
            profile(10, "r1", Some("zed")),
            profile(11, "r2", Some("amy")),
            profile(12, "r3", Some("bea")),
            profile(13, "r4", Some("abe")),
        ];

        let stats = compute_referral_ranks(&profiles);
        // Earlier joiner first, then missing timestamps alphabetically.
        assert_eq!(stats.ranked_ids(), vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_count_beats_join_time() {
        let profiles = vec![
            joined(profile(1, "early", None), "2020-01-01T00:00:00Z"),
            profile(2, "late", None),
            profile(3, "x", Some("early")),
            profile(4, "y", Some("late")),
            profile(5, "z", Some("late")),
        ];

        let stats = compute_referral_ranks(&profiles);
        assert_eq!(stats.rank_of(2), Some(1));
        assert_eq!(stats.rank_of(1), Some(2));
    }

    #[test]
    fn test_only_top_n_ranked() {
        let mut profiles: Vec<Profile> = (1..=12)
            .map(|id| profile(id, &format!("referrer{id:02}"), None))
            .collect();
        for id in 1..=12 {
            profiles.push(profile(100 + id, "fan", Some(&format!("referrer{id:02}"))));
        }

        let stats = compute_referral_ranks(&profiles);
        assert_eq!(stats.count_by_id.len(), 12);
        assert_eq!(stats.rank_by_id.len(), 10);

        let mut ranks: Vec<u32> = stats.rank_by_id.values().copied().collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=10).collect::<Vec<_>>());

        let top3 = compute_referral_ranks_top(&profiles, 3);
        assert_eq!(top3.rank_by_id.len(), 3);
    }

    #[test]
    fn test_name_collisions() {
        let profiles = vec![
            profile(1, "Alice", None),
            profile(2, " alice ", None),
            profile(3, "Bob", None),
            profile(4, "", None),
        ];

        let collisions = name_collisions(&profiles);
        assert_eq!(collisions.get("alice"), Some(&2));
        assert_eq!(collisions.get("bob"), Some(&1));
        assert_eq!(collisions.get(""), None);
    }
}
