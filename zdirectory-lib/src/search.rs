use crate::normalize::normalize_search;
use crate::pipeline::AnnotatedProfile;

/// Dropdown suggestions for free-text input, best match first.
///
/// Unlike the directory listing this looks at display name, name, link text
/// and the exact payment address. Earlier matches win over later ones:
///
/// | score | match                    |
/// |-------|--------------------------|
/// | 0     | display name prefix      |
/// | 1     | name prefix              |
/// | 2     | link text prefix         |
/// | 3     | display name substring   |
/// | 4     | name substring           |
/// | 5     | link text substring      |
/// | 6     | exact address            |
///
/// Equal scores keep input order.
pub fn suggest<'a>(profiles: &'a [AnnotatedProfile], input: &str) -> Vec<&'a AnnotatedProfile> {
    let query = normalize_search(input);
    if query.is_empty() {
        return Vec::new();
    }
    let address = input.trim();

    let mut scored: Vec<(u8, usize, &AnnotatedProfile)> = profiles
        .iter()
        .enumerate()
        .filter_map(|(index, profile)| {
            match_score(profile, &query, address).map(|score| (score, index, profile))
        })
        .collect();
    scored.sort_by_key(|&(score, index, _)| (score, index));

    scored.into_iter().map(|(_, _, profile)| profile).collect()
}

fn match_score(profile: &AnnotatedProfile, query: &str, address: &str) -> Option<u8> {
    let display_name = profile
        .profile
        .display_name
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let name = profile.profile.name.to_lowercase();
    let links = profile.profile.link_search_text();
    let address_exact = !profile.profile.address.is_empty() && profile.profile.address == address;

    let score = if display_name.starts_with(query) {
        0
    } else if name.starts_with(query) {
        1
    } else if links.starts_with(query) {
        2
    } else if display_name.contains(query) {
        3
    } else if name.contains(query) {
        4
    } else if links.contains(query) {
        5
    } else if address_exact {
        6
    } else {
        return None;
    };

    Some(score)
}
