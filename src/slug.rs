//! URL slugs for posts, labels, layouts and settings keys.

use thiserror::Error;
use uuid::Uuid;

use crate::{error::RepoError, repository::Repository};

pub const MAX_SLUG_LEN: usize = 80;

/// Slugs that would shadow a client route or an API path.
pub const RESERVED_SLUGS: &[&str] = &[
    "admin",
    "api",
    "auth",
    "dashboard",
    "edit",
    "feed",
    "health",
    "images",
    "labels",
    "login",
    "logout",
    "new",
    "posts",
    "register",
    "rss",
    "search",
    "settings",
    "swagger-ui",
    "uploads",
];

const MAX_NUMBERED_CANDIDATE: u32 = 99;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("must not be empty")]
    Empty,
    #[error("must be at most 80 characters")]
    TooLong,
    #[error("may only contain lowercase letters, digits and hyphens")]
    InvalidCharacters,
    #[error("must not start or end with a hyphen or contain consecutive hyphens")]
    MisplacedHyphen,
    #[error("'{0}' is reserved")]
    Reserved(String),
}

pub fn is_reserved(slug: &str) -> bool {
    RESERVED_SLUGS.contains(&slug)
}

/// slugify
///
/// Derives a slug from free text. Separators collapse into single hyphens and
/// anything outside `[a-z0-9]` is dropped. Never returns an empty string.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || matches!(ch, '-' | '_' | '/' | '.') {
            pending_hyphen = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

/// validate_slug
///
/// Checks a client-supplied slug without rewriting it.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::Empty);
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong);
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(SlugError::InvalidCharacters);
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return Err(SlugError::MisplacedHyphen);
    }
    if is_reserved(slug) {
        return Err(SlugError::Reserved(slug.to_string()));
    }
    Ok(())
}

/// Appends `suffix` to `base`, cutting `base` so the result stays within the length limit.
fn with_suffix(base: &str, suffix: &str) -> String {
    let room = MAX_SLUG_LEN.saturating_sub(suffix.len() + 1);
    let trimmed = if base.len() > room {
        base[..room].trim_end_matches('-')
    } else {
        base
    };
    format!("{trimmed}-{suffix}")
}

/// candidates
///
/// The ordered slugs tried for `base`: `base`, `base-2`, ..., `base-99`.
/// A reserved base is never offered bare and starts at `base-post`.
pub fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    let first = if is_reserved(base) {
        with_suffix(base, "post")
    } else {
        base.to_string()
    };
    std::iter::once(first)
        .chain((2..=MAX_NUMBERED_CANDIDATE).map(move |n| with_suffix(base, &n.to_string())))
}

/// Last resort once every numbered candidate is taken.
pub fn random_suffixed(base: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    with_suffix(base, &id[..8])
}

/// unique_slug
///
/// Finds the first candidate for `base` that no other post uses.
/// `exclude_post_id` lets a post keep its own slug on update.
pub async fn unique_slug(
    repo: &dyn Repository,
    base: &str,
    exclude_post_id: Option<Uuid>,
) -> Result<String, RepoError> {
    for candidate in candidates(base) {
        if !repo.post_slug_taken(&candidate, exclude_post_id).await? {
            return Ok(candidate);
        }
    }
    tracing::warn!(base, "numbered slug candidates exhausted");
    Ok(random_suffixed(base))
}
