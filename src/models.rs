use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enumerations stored as text columns ---

/// Role
///
/// The RBAC field of `public.profiles`. Only admins author content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// PostStatus
///
/// Publication state. Only `published` posts are visible on the public site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

impl TryFrom<String> for PostStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- Core records (mapped to database rows) ---

/// Profile
///
/// A user record extending Supabase's `auth.users`, carrying the role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    // Primary key, shared with auth.users.id.
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Post
///
/// A blog/story entry. `content` is the editor document; `content_text` and
/// `content_html` are derived from it on every save.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    #[schema(value_type = Object)]
    #[ts(type = "unknown")]
    pub content: Value,
    pub content_text: String,
    pub content_html: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: PostStatus,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    // Loaded separately from post_labels.
    #[sqlx(skip)]
    pub labels: Vec<Label>,
}

/// PostSummary
///
/// Listing shape of a post, without the heavy content fields.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub labels: Vec<Label>,
}

impl From<Post> for PostSummary {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            cover_image: post.cover_image,
            status: post.status,
            published_at: post.published_at,
            updated_at: post.updated_at,
            labels: post.labels,
        }
    }
}

/// PostFilter
///
/// Repository-level listing filter. `status: None` means every status (admin view).
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub label_slug: Option<String>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// PostListQuery
///
/// Query string of the post listings. `status` is only honoured on the admin listing.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct PostListQuery {
    /// Label slug to filter by.
    pub label: Option<String>,
    /// Case-insensitive search over title and text.
    pub q: Option<String>,
    pub status: Option<PostStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PostListQuery {
    /// Converts to a repository filter, clamping the page window.
    pub fn into_filter(self, status: Option<PostStatus>) -> PostFilter {
        PostFilter {
            status,
            label_slug: self.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            search: self.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

/// NewPost
///
/// Fully derived insert payload, assembled by the post handlers.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub content: Value,
    pub content_text: String,
    pub content_html: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
}

/// Label
///
/// A tag attached to posts through the `post_labels` join table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub color: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    // Number of published posts carrying the label; filled by listing queries.
    #[sqlx(default)]
    pub post_count: i64,
}

/// Image
///
/// An uploaded blob known to the `images` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Image {
    pub id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub storage_key: String,
    pub url: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
}

/// PostImageRef
///
/// One row of the `post_images` usage index: post `post_id` references `image_url`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PostImageRef {
    pub post_id: Uuid,
    pub image_url: String,
    pub image_id: Option<Uuid>,
    pub position: i32,
}

/// ImageUsage
///
/// Joined row of the usage index with the referencing post.
#[derive(Debug, Clone, FromRow)]
pub struct ImageUsage {
    pub image_url: String,
    pub post_id: Uuid,
    pub post_title: String,
    pub post_slug: String,
}

/// Rows added and removed when one post's usage rows were replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingDiff {
    pub inserted: u64,
    pub removed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct PostRef {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

/// ImageSummary
///
/// One entry of the admin image library: an image URL, the upload record
/// behind it (if it was uploaded here) and the posts using it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageSummary {
    pub url: String,
    pub image: Option<Image>,
    pub usage_count: i64,
    pub posts: Vec<PostRef>,
}

/// Which code path produced an image listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ListingSource {
    /// Built from the `post_images` usage index.
    Tracked,
    /// Built by parsing every post's content.
    ContentScan,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ImageListing {
    pub source: ListingSource,
    pub images: Vec<ImageSummary>,
}

/// ReconcileReport
///
/// Outcome of rebuilding the image usage index.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ReconcileReport {
    pub posts_scanned: i64,
    pub references_found: i64,
    pub rows_inserted: i64,
    pub rows_removed: i64,
    /// URLs of uploaded images no post references.
    pub orphaned_images: Vec<String>,
}

/// Setting
///
/// A row of the key/value `settings` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Setting {
    pub key: String,
    #[schema(value_type = Object)]
    #[ts(type = "unknown")]
    pub value: Value,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum OutputFormat {
    Original,
    #[default]
    Webp,
    Jpeg,
}

/// CompressionSettings
///
/// The policy the editor applies to images before uploading them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// Encoder quality, 1-100.
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub format: OutputFormat,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: 80,
            max_width: 1920,
            max_height: 1920,
            format: OutputFormat::Webp,
        }
    }
}

impl CompressionSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(1..=100).contains(&self.quality) {
            errors.push("quality must be between 1 and 100".to_string());
        }
        for (name, value) in [("max_width", self.max_width), ("max_height", self.max_height)] {
            if !(16..=8192).contains(&value) {
                errors.push(format!("{name} must be between 16 and 8192"));
            }
        }
        errors
    }
}

// --- Request payloads ---

fn empty_document() -> Value {
    serde_json::json!({ "type": "doc", "content": [] })
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    /// Explicit slug; derived from the title when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default = "empty_document")]
    #[schema(value_type = Object)]
    #[ts(type = "unknown")]
    pub content: Value,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub label_ids: Vec<Uuid>,
}

/// UpdatePostRequest
///
/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    #[ts(type = "unknown")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StatusRequest {
    pub status: PostStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SetLabelsRequest {
    pub label_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateLabelRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateLabelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateImageRequest {
    pub alt_text: Option<String>,
}

/// RegisterUserRequest
///
/// The password is only forwarded to Supabase Auth, never stored or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RoleUpdateRequest {
    pub role: Role,
}

/// PresignedUrlRequest
///
/// Input for a short-lived direct-upload URL (`POST /admin/images/presigned`).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename. The stored extension follows `file_type`.
    #[schema(example = "sunset.jpg")]
    pub filename: String,
    /// The MIME type the upload is constrained to.
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key the file will be stored under.
    pub resource_key: String,
    /// Where the object will be readable once uploaded.
    pub public_url: String,
}

// --- Output schemas ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SlugCheckResponse {
    pub slug: String,
    pub valid: bool,
    pub available: bool,
    pub error: Option<String>,
    /// First free, valid slug derived from the input.
    pub suggestion: String,
}

/// AdminStats
///
/// Counters for the dashboard (`GET /admin/stats`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdminStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub total_images: i64,
    pub total_labels: i64,
    pub total_users: i64,
    /// Uploaded images that no post references.
    pub unreferenced_images: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StorageStatus {
    pub driver: String,
    /// Bucket name or filesystem root.
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_clamps_page_window() {
        let filter = PostListQuery {
            limit: Some(500),
            offset: Some(-4),
            q: Some("   ".to_string()),
            ..PostListQuery::default()
        }
        .into_filter(Some(PostStatus::Published));

        assert_eq!(filter.limit, MAX_PAGE_SIZE);
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.search, None);
        assert_eq!(filter.status, Some(PostStatus::Published));
        assert_eq!(PostListQuery::default().into_filter(None).limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn compression_bounds() {
        assert!(CompressionSettings::default().validate().is_empty());
        let bad = CompressionSettings {
            quality: 0,
            max_width: 8,
            ..CompressionSettings::default()
        };
        assert_eq!(bad.validate().len(), 2);
    }

    #[test]
    fn role_round_trips_through_text_column() {
        assert_eq!(Role::try_from("admin".to_string()).unwrap(), Role::Admin);
        assert!(PostStatus::try_from("archived".to_string()).is_err());
    }
}
