//! HTTP handlers, one module per resource.
//!
//! Admin handlers sit behind the `require_admin` route layer; they only take
//! an [`AdminUser`](crate::auth::AdminUser) argument when they need the caller's id.

pub mod account;
pub mod admin;
pub mod images;
pub mod labels;
pub mod layouts;
pub mod posts;
pub mod settings;

/// Trims and drops empty strings, so `""` in a payload clears an optional field.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
