use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder, types::Json};
use uuid::Uuid;

use super::{RepoResult, Repository};
use crate::{
    layout::{PageLayout, StoredLayout},
    models::{
        AdminStats, Image, Label, NewImage, NewPost, Post, PostFilter, PostImageRef, Profile,
        Role, Setting, ImageUsage, TrackingDiff,
    },
};

const POST_COLUMNS: &str = "p.id, p.author_id, p.title, p.slug, p.content, p.content_text, \
     p.content_html, p.excerpt, p.cover_image, p.status, p.published_at, p.created_at, p.updated_at";

const RETURNING_POST: &str = "RETURNING id, author_id, title, slug, content, content_text, \
     content_html, excerpt, cover_image, status, published_at, created_at, updated_at";

const IMAGE_COLUMNS: &str =
    "id, storage_key, url, filename, content_type, size_bytes, alt_text, uploaded_by, created_at";

const PROFILE_COLUMNS: &str = "id, email, display_name, role, created_at";

#[derive(FromRow)]
struct LabelLink {
    post_id: Uuid,
    #[sqlx(flatten)]
    label: Label,
}

#[derive(FromRow)]
struct LayoutRow {
    layout: Json<PageLayout>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl From<LayoutRow> for StoredLayout {
    fn from(row: LayoutRow) -> Self {
        StoredLayout {
            layout: row.layout.0,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        }
    }
}

/// `%term%` for `ILIKE`, with the term's own wildcards matched literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// PostgresRepository
///
/// The `Repository` implementation backed by the Supabase Postgres database.
/// Queries are built at runtime so the crate compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the labels of `posts` with a single query.
    async fn attach_labels(&self, posts: &mut [Post]) -> RepoResult<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();

        let links = sqlx::query_as::<_, LabelLink>(
            r#"
            SELECT pl.post_id, l.id, l.name, l.slug, l.color, l.created_at
            FROM post_labels pl
            JOIN labels l ON l.id = pl.label_id
            WHERE pl.post_id = ANY($1)
            ORDER BY l.name
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        for link in links {
            if let Some(post) = posts.iter_mut().find(|p| p.id == link.post_id) {
                post.labels.push(link.label);
            }
        }
        Ok(())
    }

    async fn with_labels(&self, post: Option<Post>) -> RepoResult<Option<Post>> {
        match post {
            Some(post) => {
                let mut one = [post];
                self.attach_labels(&mut one).await?;
                let [post] = one;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- PROFILES ---

    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        Ok(sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_profile(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
        role: Role,
    ) -> RepoResult<Profile> {
        let sql = format!(
            "INSERT INTO profiles (id, email, display_name, role) VALUES ($1, $2, $3, $4) \
             RETURNING {PROFILE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(email)
            .bind(display_name)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_profiles(&self) -> RepoResult<Vec<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at");
        Ok(sqlx::query_as::<_, Profile>(&sql).fetch_all(&self.pool).await?)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> RepoResult<Option<Profile>> {
        let sql = format!("UPDATE profiles SET role = $2 WHERE id = $1 RETURNING {PROFILE_COLUMNS}");
        Ok(sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- POSTS ---

    /// list_posts
    ///
    /// Optional filters are appended with `QueryBuilder` so every value is bound, never interpolated.
    async fn list_posts(&self, filter: &PostFilter) -> RepoResult<Vec<Post>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts p WHERE TRUE"));

        if let Some(status) = filter.status {
            builder.push(" AND p.status = ");
            builder.push_bind(status.as_str());
        }

        if let Some(label) = &filter.label_slug {
            builder.push(
                " AND EXISTS (SELECT 1 FROM post_labels pl JOIN labels l ON l.id = pl.label_id \
                 WHERE pl.post_id = p.id AND l.slug = ",
            );
            builder.push_bind(label.clone());
            builder.push(")");
        }

        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            builder.push(" AND (p.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(r" ESCAPE '\' OR p.content_text ILIKE ");
            builder.push_bind(pattern);
            builder.push(r" ESCAPE '\')");
        }

        builder.push(" ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.created_at DESC");
        builder.push(" LIMIT ");
        builder.push_bind(filter.limit);
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset);

        let mut posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;
        self.attach_labels(&mut posts).await?;
        Ok(posts)
    }

    async fn all_posts(&self) -> RepoResult<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p ORDER BY p.created_at");
        Ok(sqlx::query_as::<_, Post>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = $1");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.with_labels(post).await
    }

    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.slug = $1");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        self.with_labels(post).await
    }

    async fn post_slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_post(&self, post: NewPost) -> RepoResult<Post> {
        let sql = format!(
            "INSERT INTO posts (id, author_id, title, slug, content, content_text, content_html, \
             excerpt, cover_image, status, published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW()) {RETURNING_POST}"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4())
            .bind(post.author_id)
            .bind(post.title)
            .bind(post.slug)
            .bind(post.content)
            .bind(post.content_text)
            .bind(post.content_html)
            .bind(post.excerpt)
            .bind(post.cover_image)
            .bind(post.status.as_str())
            .bind(post.published_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_post(&self, id: Uuid, post: NewPost) -> RepoResult<Option<Post>> {
        let sql = format!(
            "UPDATE posts SET title = $2, slug = $3, content = $4, content_text = $5, \
             content_html = $6, excerpt = $7, cover_image = $8, status = $9, published_at = $10, \
             updated_at = NOW() WHERE id = $1 {RETURNING_POST}"
        );
        let updated = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(post.title)
            .bind(post.slug)
            .bind(post.content)
            .bind(post.content_text)
            .bind(post.content_html)
            .bind(post.excerpt)
            .bind(post.cover_image)
            .bind(post.status.as_str())
            .bind(post.published_at)
            .fetch_optional(&self.pool)
            .await?;
        self.with_labels(updated).await
    }

    /// delete_post
    ///
    /// `post_labels` and `post_images` rows go with the post through `ON DELETE CASCADE`.
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_post_labels(&self, post_id: Uuid, label_ids: &[Uuid]) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM post_labels WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO post_labels (post_id, label_id) SELECT $1, UNNEST($2::uuid[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(label_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // --- LABELS ---

    /// list_labels
    ///
    /// `post_count` only counts published posts, matching what the public site shows.
    async fn list_labels(&self) -> RepoResult<Vec<Label>> {
        Ok(sqlx::query_as::<_, Label>(
            r#"
            SELECT l.id, l.name, l.slug, l.color, l.created_at, COUNT(p.id) AS post_count
            FROM labels l
            LEFT JOIN post_labels pl ON pl.label_id = l.id
            LEFT JOIN posts p ON p.id = pl.post_id AND p.status = 'published'
            GROUP BY l.id
            ORDER BY l.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_label(&self, id: Uuid) -> RepoResult<Option<Label>> {
        Ok(sqlx::query_as::<_, Label>(
            "SELECT id, name, slug, color, created_at FROM labels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_label(&self, name: &str, slug: &str, color: Option<&str>) -> RepoResult<Label> {
        Ok(sqlx::query_as::<_, Label>(
            "INSERT INTO labels (id, name, slug, color) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, slug, color, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .bind(color)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_label(
        &self,
        id: Uuid,
        name: &str,
        slug: &str,
        color: Option<&str>,
    ) -> RepoResult<Option<Label>> {
        Ok(sqlx::query_as::<_, Label>(
            "UPDATE labels SET name = $2, slug = $3, color = $4 WHERE id = $1 \
             RETURNING id, name, slug, color, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(slug)
        .bind(color)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_label(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM labels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- IMAGES ---

    async fn insert_image(&self, image: NewImage) -> RepoResult<Image> {
        let sql = format!(
            "INSERT INTO images (id, storage_key, url, filename, content_type, size_bytes, alt_text, \
             uploaded_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {IMAGE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(Uuid::new_v4())
            .bind(image.storage_key)
            .bind(image.url)
            .bind(image.filename)
            .bind(image.content_type)
            .bind(image.size_bytes)
            .bind(image.alt_text)
            .bind(image.uploaded_by)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_image(&self, id: Uuid) -> RepoResult<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1");
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_images(&self) -> RepoResult<Vec<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Image>(&sql).fetch_all(&self.pool).await?)
    }

    async fn update_image_alt(&self, id: Uuid, alt_text: Option<&str>) -> RepoResult<Option<Image>> {
        let sql = format!("UPDATE images SET alt_text = $2 WHERE id = $1 RETURNING {IMAGE_COLUMNS}");
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(id)
            .bind(alt_text)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_image(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- IMAGE USAGE INDEX ---

    async fn tracked_usage(&self) -> RepoResult<Vec<ImageUsage>> {
        Ok(sqlx::query_as::<_, ImageUsage>(
            r#"
            SELECT pi.image_url, p.id AS post_id, p.title AS post_title, p.slug AS post_slug
            FROM post_images pi
            JOIN posts p ON p.id = pi.post_id
            ORDER BY pi.image_url, pi.position
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// replace_post_images
    ///
    /// Runs in one transaction: stale rows are deleted, current ones upserted.
    /// `xmax = 0` distinguishes a fresh insert from an update of an existing row.
    async fn replace_post_images(
        &self,
        post_id: Uuid,
        refs: &[PostImageRef],
    ) -> RepoResult<TrackingDiff> {
        let urls: Vec<String> = refs.iter().map(|r| r.image_url.clone()).collect();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM post_images WHERE post_id = $1 AND NOT (image_url = ANY($2))",
        )
        .bind(post_id)
        .bind(urls.as_slice())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mut inserted = 0;
        for r in refs {
            let fresh = sqlx::query_scalar::<_, bool>(
                "INSERT INTO post_images (post_id, image_url, image_id, position) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (post_id, image_url) \
                 DO UPDATE SET image_id = EXCLUDED.image_id, position = EXCLUDED.position \
                 RETURNING (xmax = 0)",
            )
            .bind(post_id)
            .bind(&r.image_url)
            .bind(r.image_id)
            .bind(r.position)
            .fetch_one(&mut *tx)
            .await?;
            if fresh {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(TrackingDiff { inserted, removed })
    }

    // --- SETTINGS & LAYOUTS ---

    async fn get_setting(&self, key: &str) -> RepoResult<Option<Setting>> {
        Ok(sqlx::query_as::<_, Setting>(
            "SELECT key, value, updated_at FROM settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_settings(&self) -> RepoResult<Vec<Setting>> {
        Ok(
            sqlx::query_as::<_, Setting>("SELECT key, value, updated_at FROM settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn put_setting(&self, key: &str, value: Value) -> RepoResult<Setting> {
        Ok(sqlx::query_as::<_, Setting>(
            "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW() \
             RETURNING key, value, updated_at",
        )
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_layout(&self, page: &str) -> RepoResult<Option<StoredLayout>> {
        let row = sqlx::query_as::<_, LayoutRow>(
            "SELECT layout, updated_at, updated_by FROM page_layouts WHERE page = $1",
        )
        .bind(page)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StoredLayout::from))
    }

    async fn list_layouts(&self) -> RepoResult<Vec<StoredLayout>> {
        let rows = sqlx::query_as::<_, LayoutRow>(
            "SELECT layout, updated_at, updated_by FROM page_layouts ORDER BY page",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredLayout::from).collect())
    }

    async fn put_layout(
        &self,
        layout: &PageLayout,
        updated_by: Option<Uuid>,
    ) -> RepoResult<StoredLayout> {
        let row = sqlx::query_as::<_, LayoutRow>(
            "INSERT INTO page_layouts (page, layout, updated_by, updated_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (page) DO UPDATE \
             SET layout = EXCLUDED.layout, updated_by = EXCLUDED.updated_by, updated_at = NOW() \
             RETURNING layout, updated_at, updated_by",
        )
        .bind(&layout.page)
        .bind(Json(layout))
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn stats(&self) -> RepoResult<AdminStats> {
        let (total_posts, published_posts, draft_posts, total_images, total_labels, total_users) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM posts),
                    (SELECT COUNT(*) FROM posts WHERE status = 'published'),
                    (SELECT COUNT(*) FROM posts WHERE status = 'draft'),
                    (SELECT COUNT(*) FROM images),
                    (SELECT COUNT(*) FROM labels),
                    (SELECT COUNT(*) FROM profiles)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(AdminStats {
            total_posts,
            published_posts,
            draft_posts,
            total_images,
            total_labels,
            total_users,
            unreferenced_images: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("lake"), "%lake%");
        assert_eq!(like_pattern("_"), r"%\_%");
        assert_eq!(like_pattern(r"50% off\now"), r"%50\% off\\now%");
    }
}
