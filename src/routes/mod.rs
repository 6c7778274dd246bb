/// Router Module Index
///
/// Routes are split by who may call them; access control is applied per
/// module as an axum route layer in `create_router`.

/// Anonymous, read-only routes of the public site plus registration.
pub mod public;

/// Routes behind `require_auth`.
pub mod authenticated;

/// Routes nested under `/admin` behind `require_admin`.
pub mod admin;
