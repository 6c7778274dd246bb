use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RepoResult, Repository};
use crate::{
    error::RepoError,
    layout::{PageLayout, StoredLayout},
    models::{
        AdminStats, Image, Label, NewImage, NewPost, Post, PostFilter, PostImageRef, PostStatus,
        Profile, Role, Setting, ImageUsage, TrackingDiff,
    },
};

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    posts: HashMap<Uuid, Post>,
    labels: HashMap<Uuid, Label>,
    post_labels: HashSet<(Uuid, Uuid)>,
    images: HashMap<Uuid, Image>,
    post_images: Vec<PostImageRef>,
    settings: BTreeMap<String, Setting>,
    layouts: BTreeMap<String, StoredLayout>,
}

impl Tables {
    fn labels_of(&self, post_id: Uuid) -> Vec<Label> {
        let mut labels: Vec<Label> = self
            .post_labels
            .iter()
            .filter(|(p, _)| *p == post_id)
            .filter_map(|(_, l)| self.labels.get(l).cloned())
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels
    }

    fn with_labels(&self, post: &Post) -> Post {
        let mut post = post.clone();
        post.labels = self.labels_of(post.id);
        post
    }

    fn unique_violation(&self, what: &str) -> RepoError {
        RepoError::Conflict(format!("duplicate key value violates unique constraint on {what}"))
    }
}

/// MemoryRepository
///
/// An in-process `Repository` used by the test suite and for running the API
/// without a database. Mirrors the Postgres constraints that handlers rely on:
/// unique slugs, unique image keys and cascading deletes.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    // Simulates a database created before the post_images table existed.
    tracking_disabled: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose usage index behaves like a missing table.
    pub fn without_image_tracking() -> Self {
        let repo = Self::default();
        repo.tracking_disabled.store(true, Ordering::SeqCst);
        repo
    }

    /// Number of rows currently in the usage index.
    pub async fn tracked_rows(&self) -> usize {
        self.tables.read().await.post_images.len()
    }

    fn check_tracking(&self) -> RepoResult<()> {
        if self.tracking_disabled.load(Ordering::SeqCst) {
            Err(RepoError::MissingTable(
                "relation \"post_images\" does not exist".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn matches_filter(tables: &Tables, post: &Post, filter: &PostFilter) -> bool {
    if let Some(status) = filter.status {
        if post.status != status {
            return false;
        }
    }
    if let Some(slug) = &filter.label_slug {
        let tagged = tables.post_labels.iter().any(|(p, l)| {
            *p == post.id && tables.labels.get(l).is_some_and(|label| &label.slug == slug)
        });
        if !tagged {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        if !post.title.to_lowercase().contains(&needle)
            && !post.content_text.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn create_profile(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
        role: Role,
    ) -> RepoResult<Profile> {
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&id) {
            return Err(tables.unique_violation("profiles.id"));
        }
        let profile = Profile {
            id,
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            role,
            created_at: Utc::now(),
        };
        tables.profiles.insert(id, profile.clone());
        Ok(profile)
    }

    async fn list_profiles(&self) -> RepoResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> =
            self.tables.read().await.profiles.values().cloned().collect();
        profiles.sort_by_key(|p| p.created_at);
        Ok(profiles)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> RepoResult<Option<Profile>> {
        let mut tables = self.tables.write().await;
        Ok(tables.profiles.get_mut(&id).map(|profile| {
            profile.role = role;
            profile.clone()
        }))
    }

    async fn list_posts(&self, filter: &PostFilter) -> RepoResult<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<&Post> = tables
            .posts
            .values()
            .filter(|post| matches_filter(&tables, post, filter))
            .collect();
        posts.sort_by(|a, b| {
            let ka = a.published_at.unwrap_or(a.created_at);
            let kb = b.published_at.unwrap_or(b.created_at);
            kb.cmp(&ka).then(b.created_at.cmp(&a.created_at))
        });

        Ok(posts
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(|post| tables.with_labels(post))
            .collect())
    }

    async fn all_posts(&self) -> RepoResult<Vec<Post>> {
        let mut posts: Vec<Post> = self.tables.read().await.posts.values().cloned().collect();
        posts.sort_by_key(|p| p.created_at);
        Ok(posts)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables.posts.get(&id).map(|post| tables.with_labels(post)))
    }

    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .values()
            .find(|post| post.slug == slug)
            .map(|post| tables.with_labels(post)))
    }

    async fn post_slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> RepoResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .posts
            .values()
            .any(|post| post.slug == slug && Some(post.id) != exclude))
    }

    async fn insert_post(&self, new: NewPost) -> RepoResult<Post> {
        let mut tables = self.tables.write().await;
        if tables.posts.values().any(|p| p.slug == new.slug) {
            return Err(tables.unique_violation("posts.slug"));
        }
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            title: new.title,
            slug: new.slug,
            content: new.content,
            content_text: new.content_text,
            content_html: new.content_html,
            excerpt: new.excerpt,
            cover_image: new.cover_image,
            status: new.status,
            published_at: new.published_at,
            created_at: now,
            updated_at: now,
            labels: Vec::new(),
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, new: NewPost) -> RepoResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        if tables.posts.values().any(|p| p.slug == new.slug && p.id != id) {
            return Err(tables.unique_violation("posts.slug"));
        }
        let Some(post) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        post.title = new.title;
        post.slug = new.slug;
        post.content = new.content;
        post.content_text = new.content_text;
        post.content_html = new.content_html;
        post.excerpt = new.excerpt;
        post.cover_image = new.cover_image;
        post.status = new.status;
        post.published_at = new.published_at;
        post.updated_at = Utc::now();
        let post = post.clone();
        Ok(Some(tables.with_labels(&post)))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        let existed = tables.posts.remove(&id).is_some();
        tables.post_labels.retain(|(p, _)| *p != id);
        tables.post_images.retain(|r| r.post_id != id);
        Ok(existed)
    }

    async fn set_post_labels(&self, post_id: Uuid, label_ids: &[Uuid]) -> RepoResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = label_ids.iter().find(|id| !tables.labels.contains_key(*id)) {
            return Err(RepoError::Conflict(format!("label {missing} does not exist")));
        }
        tables.post_labels.retain(|(p, _)| *p != post_id);
        for label_id in label_ids {
            tables.post_labels.insert((post_id, *label_id));
        }
        Ok(())
    }

    async fn list_labels(&self) -> RepoResult<Vec<Label>> {
        let tables = self.tables.read().await;
        let mut labels: Vec<Label> = tables
            .labels
            .values()
            .map(|label| {
                let mut label = label.clone();
                label.post_count = tables
                    .post_labels
                    .iter()
                    .filter(|(p, l)| {
                        *l == label.id
                            && tables
                                .posts
                                .get(p)
                                .is_some_and(|post| post.status == PostStatus::Published)
                    })
                    .count() as i64;
                label
            })
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(labels)
    }

    async fn get_label(&self, id: Uuid) -> RepoResult<Option<Label>> {
        Ok(self.tables.read().await.labels.get(&id).cloned())
    }

    async fn insert_label(&self, name: &str, slug: &str, color: Option<&str>) -> RepoResult<Label> {
        let mut tables = self.tables.write().await;
        if tables.labels.values().any(|l| l.slug == slug) {
            return Err(tables.unique_violation("labels.slug"));
        }
        let label = Label {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            color: color.map(str::to_string),
            created_at: Utc::now(),
            post_count: 0,
        };
        tables.labels.insert(label.id, label.clone());
        Ok(label)
    }

    async fn update_label(
        &self,
        id: Uuid,
        name: &str,
        slug: &str,
        color: Option<&str>,
    ) -> RepoResult<Option<Label>> {
        let mut tables = self.tables.write().await;
        if tables.labels.values().any(|l| l.slug == slug && l.id != id) {
            return Err(tables.unique_violation("labels.slug"));
        }
        Ok(tables.labels.get_mut(&id).map(|label| {
            label.name = name.to_string();
            label.slug = slug.to_string();
            label.color = color.map(str::to_string);
            label.clone()
        }))
    }

    async fn delete_label(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        tables.post_labels.retain(|(_, l)| *l != id);
        Ok(tables.labels.remove(&id).is_some())
    }

    async fn insert_image(&self, new: NewImage) -> RepoResult<Image> {
        let mut tables = self.tables.write().await;
        if tables
            .images
            .values()
            .any(|i| i.storage_key == new.storage_key || i.url == new.url)
        {
            return Err(tables.unique_violation("images.storage_key"));
        }
        let image = Image {
            id: Uuid::new_v4(),
            storage_key: new.storage_key,
            url: new.url,
            filename: new.filename,
            content_type: new.content_type,
            size_bytes: new.size_bytes,
            alt_text: new.alt_text,
            uploaded_by: new.uploaded_by,
            created_at: Utc::now(),
        };
        tables.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn get_image(&self, id: Uuid) -> RepoResult<Option<Image>> {
        Ok(self.tables.read().await.images.get(&id).cloned())
    }

    async fn list_images(&self) -> RepoResult<Vec<Image>> {
        let mut images: Vec<Image> = self.tables.read().await.images.values().cloned().collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    async fn update_image_alt(&self, id: Uuid, alt_text: Option<&str>) -> RepoResult<Option<Image>> {
        let mut tables = self.tables.write().await;
        Ok(tables.images.get_mut(&id).map(|image| {
            image.alt_text = alt_text.map(str::to_string);
            image.clone()
        }))
    }

    async fn delete_image(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.images.remove(&id).is_some();
        // Mirrors ON DELETE SET NULL on post_images.image_id.
        for r in tables.post_images.iter_mut().filter(|r| r.image_id == Some(id)) {
            r.image_id = None;
        }
        Ok(removed)
    }

    async fn tracked_usage(&self) -> RepoResult<Vec<ImageUsage>> {
        self.check_tracking()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<(&PostImageRef, &Post)> = tables
            .post_images
            .iter()
            .filter_map(|r| tables.posts.get(&r.post_id).map(|post| (r, post)))
            .collect();
        rows.sort_by(|(a, _), (b, _)| a.image_url.cmp(&b.image_url).then(a.position.cmp(&b.position)));

        Ok(rows
            .into_iter()
            .map(|(r, post)| ImageUsage {
                image_url: r.image_url.clone(),
                post_id: post.id,
                post_title: post.title.clone(),
                post_slug: post.slug.clone(),
            })
            .collect())
    }

    async fn replace_post_images(
        &self,
        post_id: Uuid,
        refs: &[PostImageRef],
    ) -> RepoResult<TrackingDiff> {
        self.check_tracking()?;
        let mut tables = self.tables.write().await;

        let before = tables.post_images.len();
        tables
            .post_images
            .retain(|r| r.post_id != post_id || refs.iter().any(|n| n.image_url == r.image_url));
        let removed = (before - tables.post_images.len()) as u64;

        let mut inserted = 0;
        for new in refs {
            match tables
                .post_images
                .iter()
                .position(|r| r.post_id == post_id && r.image_url == new.image_url)
            {
                Some(idx) => {
                    let existing = &mut tables.post_images[idx];
                    existing.image_id = new.image_id;
                    existing.position = new.position;
                }
                None => {
                    tables.post_images.push(new.clone());
                    inserted += 1;
                }
            }
        }

        Ok(TrackingDiff { inserted, removed })
    }

    async fn get_setting(&self, key: &str) -> RepoResult<Option<Setting>> {
        Ok(self.tables.read().await.settings.get(key).cloned())
    }

    async fn list_settings(&self) -> RepoResult<Vec<Setting>> {
        Ok(self.tables.read().await.settings.values().cloned().collect())
    }

    async fn put_setting(&self, key: &str, value: Value) -> RepoResult<Setting> {
        let setting = Setting {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .settings
            .insert(key.to_string(), setting.clone());
        Ok(setting)
    }

    async fn get_layout(&self, page: &str) -> RepoResult<Option<StoredLayout>> {
        Ok(self.tables.read().await.layouts.get(page).cloned())
    }

    async fn list_layouts(&self) -> RepoResult<Vec<StoredLayout>> {
        Ok(self.tables.read().await.layouts.values().cloned().collect())
    }

    async fn put_layout(
        &self,
        layout: &PageLayout,
        updated_by: Option<Uuid>,
    ) -> RepoResult<StoredLayout> {
        let stored = StoredLayout {
            layout: layout.clone(),
            updated_at: Utc::now(),
            updated_by,
        };
        self.tables
            .write()
            .await
            .layouts
            .insert(layout.page.clone(), stored.clone());
        Ok(stored)
    }

    async fn stats(&self) -> RepoResult<AdminStats> {
        let tables = self.tables.read().await;
        let published = tables
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Published)
            .count() as i64;
        let total = tables.posts.len() as i64;

        Ok(AdminStats {
            total_posts: total,
            published_posts: published,
            draft_posts: total - published,
            total_images: tables.images.len() as i64,
            total_labels: tables.labels.len() as i64,
            total_users: tables.profiles.len() as i64,
            unreferenced_images: 0,
        })
    }
}
