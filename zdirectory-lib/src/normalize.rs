use crate::model::Profile;
use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Canonical identity key for a free-text name, slug or referrer.
///
/// The text is NFKC-normalized, trimmed and lower-cased, whitespace runs become
/// a single `_`, and every character outside `[a-z0-9_]` is dropped. Any input
/// yields a key, possibly empty. An empty key must never be matched against
/// anything.
pub fn normalize_identity(text: &str) -> String {
    fold_whitespace(text)
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Normalize a name into a URL slug. Same as [`normalize_identity`] but keeps `-`.
pub fn normalize_slug(text: &str) -> String {
    fold_whitespace(text)
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// URL slug for a profile page.
///
/// A stored slug wins. Otherwise the normalized name is used as is for
/// profiles with a verified address, and suffixed with `-<id>` for the rest
/// so an unverified profile never claims the bare name. Empty when the name
/// normalizes to nothing.
pub fn build_slug(profile: &Profile) -> String {
    let base = normalize_slug(&profile.name);
    if base.is_empty() {
        return base;
    }

    match profile.slug.as_deref() {
        Some(slug) if !slug.is_empty() => slug.to_string(),
        _ if profile.address_verified => base,
        _ => format!("{}-{}", base, profile.id),
    }
}

/// Normalize dropdown search input.
///
/// Pasting a profile URL such as `https://x.com/SaveZcash` searches for the path
/// part only.
pub fn normalize_search(text: &str) -> String {
    let lowered = text.to_lowercase();
    url_prefix().replace(&lowered, "").trim().to_string()
}

fn fold_whitespace(text: &str) -> String {
    let lowered = text.nfkc().collect::<String>().to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join("_")
}

fn url_prefix() -> &'static Regex {
    static URL_PREFIX: OnceLock<Regex> = OnceLock::new();
    URL_PREFIX.get_or_init(|| {
        Regex::new(r"^https?://(www\.)?[^/]+/?").expect("url prefix pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity_basic() {
        assert_eq!(normalize_identity("Alice"), "alice");
        assert_eq!(normalize_identity("  Tony   Margarit "), "tony_margarit");
        assert_eq!(normalize_identity("zec.dev!"), "zecdev");
        assert_eq!(normalize_identity("under_score-dash"), "under_scoredash");
    }

    #[test]
    fn test_normalize_identity_compatibility_forms() {
        // Fullwidth letters and ligatures fold under NFKC.
        assert_eq!(normalize_identity("Ａｌｉｃｅ"), "alice");
        assert_eq!(normalize_identity("ﬁle"), "file");
        // Accented letters survive NFKC as precomposed and are dropped.
        assert_eq!(normalize_identity("Éclair"), "clair");
    }

    #[test]
    fn test_normalize_identity_empty() {
        assert_eq!(normalize_identity(""), "");
        assert_eq!(normalize_identity("   \t\n"), "");
        assert_eq!(normalize_identity("!!!"), "");
    }

    #[test]
    fn test_normalize_slug_keeps_dashes() {
        assert_eq!(normalize_slug("Save Zcash-2"), "save_zcash-2");
        assert_eq!(normalize_slug(" ? "), "");
    }

    #[test]
    fn test_build_slug() {
        let mut profile = Profile::new(445, "Frank Braun");
        assert_eq!(build_slug(&profile), "frank_braun-445");

        profile.address_verified = true;
        assert_eq!(build_slug(&profile), "frank_braun");

        profile.slug = Some("frank".to_string());
        assert_eq!(build_slug(&profile), "frank");

        let nameless = Profile::new(1, "  ");
        assert_eq!(build_slug(&nameless), "");
    }

    #[test]
    fn test_normalize_search_strips_url_prefix() {
        assert_eq!(normalize_search("https://x.com/SaveZcash"), "savezcash");
        assert_eq!(normalize_search("http://www.github.com/"), "");
        assert_eq!(normalize_search("  Zec  "), "zec");
    }
}
