use crate::normalize::normalize_search;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Backend-assigned profile identifier
pub type ProfileId = i64;

/// External social or website URL attached to a profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub url: String,
    pub label: String,
    /// Whether the profile owner proved control of this account
    pub is_verified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub country: Option<String>,
    pub iso2: Option<String>,
}

/// Leaderboard snapshot supplied by the backend. `0` means unranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRanks {
    pub alltime: u32,
    pub weekly: u32,
    pub monthly: u32,
    pub daily: u32,
}

impl LeaderboardRanks {
    /// True when the all-time, weekly or monthly rank falls within `1..=size`.
    /// The daily board does not count.
    pub fn is_top(&self, size: u32) -> bool {
        [self.alltime, self.weekly, self.monthly]
            .iter()
            .any(|rank| (1..=size).contains(rank))
    }
}

/// Canonical directory entry.
///
/// Built once from a [`ProfileRecord`] at the ingestion boundary; everything
/// downstream reads these fields without fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    /// Free-text handle. Empty when the backend sent none.
    pub name: String,
    pub display_name: Option<String>,
    pub slug: Option<String>,
    /// Opaque payment address
    pub address: String,
    pub address_verified: bool,
    /// General trust flag, distinct from `address_verified`
    pub verified: bool,
    /// Free-text name of the referring profile, unvalidated
    pub referred_by: Option<String>,
    pub referred_by_id: Option<ProfileId>,
    /// Referral rank as last stored by the backend
    pub referral_rank: u32,
    pub referrer_count: u32,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub location: Option<Location>,
    pub links: Vec<Link>,
    /// Server-side aggregate, preferred over counting `links`
    pub verified_links_count: Option<u32>,
    pub ranks: LeaderboardRanks,
    pub featured: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_signed_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(id: ProfileId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of verified links, preferring the backend aggregate when present
    pub fn verified_link_count(&self) -> u32 {
        self.verified_links_count.unwrap_or_else(|| {
            self.links.iter().filter(|link| link.is_verified).count() as u32
        })
    }

    /// Whether `referred_by` names anyone at all
    pub fn has_referrer(&self) -> bool {
        self.referred_by
            .as_deref()
            .map_or(false, |referrer| !referrer.is_empty())
    }

    /// Lower-cased link labels and URL paths used by dropdown search
    pub fn link_search_text(&self) -> String {
        self.links
            .iter()
            .flat_map(|link| [link.label.to_lowercase(), normalize_search(&link.url)])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Canonicalize a raw backend row
    pub fn from_record(record: ProfileRecord) -> Self {
        let mut link_records = record.links.unwrap_or_default();
        link_records.sort_by_key(|link| (link.order_index.unwrap_or(0), link.id));

        let location = derive_location(
            record.nearest_city_name.as_deref(),
            record.country,
            record.iso2,
        );

        let joined_at = [&record.joined_at, &record.created_at, &record.since]
            .into_iter()
            .flatten()
            .find_map(|raw| parse_timestamp(raw));

        Self {
            id: record.id,
            name: record.name.unwrap_or_default(),
            display_name: record.display_name.filter(|s| !s.is_empty()),
            slug: record.slug.filter(|s| !s.is_empty()),
            address: record.address.unwrap_or_default(),
            address_verified: record.address_verified.unwrap_or(false),
            verified: record.verified.unwrap_or(false),
            referred_by: record.referred_by,
            referred_by_id: record.referred_by_zcasher_id,
            referral_rank: record.referral_rank,
            referrer_count: record.referrer_count,
            bio: record.bio,
            profile_image_url: record.profile_image_url,
            location,
            links: link_records.into_iter().map(Link::from).collect(),
            verified_links_count: record.verified_links_count,
            ranks: LeaderboardRanks {
                alltime: record.rank_alltime,
                weekly: record.rank_weekly,
                monthly: record.rank_monthly,
                daily: record.rank_daily,
            },
            featured: record.featured,
            joined_at,
            last_verified_at: record.last_verified_at.as_deref().and_then(parse_timestamp),
            last_signed_at: record.last_signed_at.as_deref().and_then(parse_timestamp),
        }
    }
}

fn derive_location(
    nearest_city_name: Option<&str>,
    country: Option<String>,
    iso2: Option<String>,
) -> Option<Location> {
    let city = nearest_city_name
        .and_then(|name| name.split(',').next())
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .map(str::to_string);

    if city.is_none() && country.is_none() && iso2.is_none() {
        return None;
    }

    Some(Location { city, country, iso2 })
}

/// Profile row as the backend sends it, with every field alias seen in the wild
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRecord {
    pub id: ProfileId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub address_verified: Option<bool>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub referred_by_zcasher_id: Option<ProfileId>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub referral_rank: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub referrer_count: u32,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub nearest_city_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub iso2: Option<String>,
    #[serde(default, alias = "zcasher_links")]
    pub links: Option<Vec<LinkRecord>>,
    #[serde(default)]
    pub verified_links_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub rank_alltime: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub rank_weekly: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub rank_monthly: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub rank_daily: u32,
    #[serde(default, deserialize_with = "strictly_true")]
    pub featured: bool,
    #[serde(default)]
    pub joined_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default, alias = "last_verified")]
    pub last_verified_at: Option<String>,
    #[serde(default)]
    pub last_signed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkRecord {
    pub id: i64,
    #[serde(default)]
    pub zcasher_id: Option<ProfileId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl From<LinkRecord> for Link {
    fn from(record: LinkRecord) -> Self {
        Self {
            id: record.id,
            url: record.url.unwrap_or_default(),
            label: record.label.unwrap_or_default(),
            is_verified: record.is_verified.unwrap_or(false),
        }
    }
}

/// Numeric field that may arrive as a number, a numeric string or null.
/// Anything that is not a number of at least 1 reads as 0.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map_or(0, count_from_value))
}

pub(crate) fn count_from_value(value: &Value) -> u32 {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() && n >= 1.0 => n.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn strictly_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(matches!(value, Some(Value::Bool(true))))
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and the Postgres text form (`2025-09-07 14:25:06.869427+00`).
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
