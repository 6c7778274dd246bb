use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::RepoError,
    layout::{PageLayout, StoredLayout},
    models::{
        AdminStats, Image, Label, NewImage, NewPost, Post, PostFilter, PostImageRef, Profile,
        Role, Setting, ImageUsage, TrackingDiff,
    },
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// The persistence contract the handlers program against. `Send + Sync +
/// async_trait` make `Arc<dyn Repository>` shareable across axum tasks.
///
/// Operations touching the `post_images` usage index may fail with
/// [`RepoError::MissingTable`] on databases that predate it; the image service
/// falls back to scanning post content in that case.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>>;
    async fn create_profile(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
        role: Role,
    ) -> RepoResult<Profile>;
    async fn list_profiles(&self) -> RepoResult<Vec<Profile>>;
    async fn set_role(&self, id: Uuid, role: Role) -> RepoResult<Option<Profile>>;

    // --- Posts ---
    /// Filtered, paginated listing with labels attached.
    async fn list_posts(&self, filter: &PostFilter) -> RepoResult<Vec<Post>>;
    /// Every post regardless of status, without labels. Used by reconciliation.
    async fn all_posts(&self) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<Post>>;
    async fn post_slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> RepoResult<bool>;
    async fn insert_post(&self, post: NewPost) -> RepoResult<Post>;
    /// Overwrites every mutable column of the post and bumps `updated_at`.
    async fn update_post(&self, id: Uuid, post: NewPost) -> RepoResult<Option<Post>>;
    /// Removes the post together with its label links and usage rows.
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool>;
    async fn set_post_labels(&self, post_id: Uuid, label_ids: &[Uuid]) -> RepoResult<()>;

    // --- Labels ---
    async fn list_labels(&self) -> RepoResult<Vec<Label>>;
    async fn get_label(&self, id: Uuid) -> RepoResult<Option<Label>>;
    async fn insert_label(&self, name: &str, slug: &str, color: Option<&str>) -> RepoResult<Label>;
    async fn update_label(
        &self,
        id: Uuid,
        name: &str,
        slug: &str,
        color: Option<&str>,
    ) -> RepoResult<Option<Label>>;
    async fn delete_label(&self, id: Uuid) -> RepoResult<bool>;

    // --- Images ---
    async fn insert_image(&self, image: NewImage) -> RepoResult<Image>;
    async fn get_image(&self, id: Uuid) -> RepoResult<Option<Image>>;
    async fn list_images(&self) -> RepoResult<Vec<Image>>;
    async fn update_image_alt(&self, id: Uuid, alt_text: Option<&str>) -> RepoResult<Option<Image>>;
    async fn delete_image(&self, id: Uuid) -> RepoResult<bool>;

    // --- Image usage index ---
    async fn tracked_usage(&self) -> RepoResult<Vec<ImageUsage>>;
    /// Makes the post's usage rows equal to `refs`.
    async fn replace_post_images(
        &self,
        post_id: Uuid,
        refs: &[PostImageRef],
    ) -> RepoResult<TrackingDiff>;

    // --- Settings & layouts ---
    async fn get_setting(&self, key: &str) -> RepoResult<Option<Setting>>;
    async fn list_settings(&self) -> RepoResult<Vec<Setting>>;
    async fn put_setting(&self, key: &str, value: Value) -> RepoResult<Setting>;
    async fn get_layout(&self, page: &str) -> RepoResult<Option<StoredLayout>>;
    async fn list_layouts(&self) -> RepoResult<Vec<StoredLayout>>;
    async fn put_layout(
        &self,
        layout: &PageLayout,
        updated_by: Option<Uuid>,
    ) -> RepoResult<StoredLayout>;

    /// Dashboard counters. `unreferenced_images` is left at zero; the image
    /// service fills it because it depends on the usage index fallback.
    async fn stats(&self) -> RepoResult<AdminStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
