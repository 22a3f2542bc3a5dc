use crate::model::Profile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How strongly a profile's identity is corroborated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustTier {
    /// Verified address and at least one verified link
    FullyVerified,
    /// Verified address, no verified links
    AddressOnly,
    /// Unverified address, at least one verified link
    LinksOnly,
    Unverified,
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrustTier::FullyVerified => "fully-verified",
            TrustTier::AddressOnly => "address-only",
            TrustTier::LinksOnly => "links-only",
            TrustTier::Unverified => "unverified",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified_address: bool,
    pub verified_link_count: u32,
    pub trust_tier: TrustTier,
}

impl Verification {
    /// One point for a verified address plus one per verified link
    pub fn score(&self) -> u32 {
        u32::from(self.verified_address) + self.verified_link_count
    }
}

pub fn classify(profile: &Profile) -> Verification {
    let verified_address = profile.address_verified || profile.verified;
    let verified_link_count = profile.verified_link_count();

    let trust_tier = match (verified_address, verified_link_count > 0) {
        (true, true) => TrustTier::FullyVerified,
        (true, false) => TrustTier::AddressOnly,
        (false, true) => TrustTier::LinksOnly,
        (false, false) => TrustTier::Unverified,
    };

    Verification {
        verified_address,
        verified_link_count,
        trust_tier,
    }
}

/// Coarse age of the last address verification, as shown on a profile card
pub fn last_verified_label(profile: &Profile, now: DateTime<Utc>) -> &'static str {
    let Some(verified_at) = profile.last_verified_at else {
        return "n/a";
    };

    let weeks = (now - verified_at).num_seconds() as f64 / (60.0 * 60.0 * 24.0 * 7.0);
    if weeks < 1.0 {
        "<1 week ago"
    } else if weeks < 2.0 {
        "<2 weeks ago"
    } else if weeks < 3.0 {
        "<3 weeks ago"
    } else if weeks < 4.0 {
        "<4 weeks ago"
    } else {
        "<1 month ago"
    }
}
