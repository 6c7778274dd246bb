use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::non_empty;
use crate::{
    AppState,
    auth::AdminUser,
    content,
    error::{AppError, AppResult},
    images,
    models::{
        CreatePostRequest, NewPost, Post, PostListQuery, PostStatus, PostSummary,
        SetLabelsRequest, SlugCheckResponse, StatusRequest, UpdatePostRequest,
    },
    repository::Repository,
    slug,
};

/// Length of excerpts derived from post text.
pub const EXCERPT_CHARS: usize = 200;

fn auto_excerpt(text: &str) -> Option<String> {
    Some(content::excerpt(text, EXCERPT_CHARS)).filter(|e| !e.is_empty())
}

/// Text, HTML and excerpt derived from a document. An explicit excerpt wins.
fn derive(document: &Value, explicit_excerpt: Option<String>) -> (String, String, Option<String>) {
    let text = content::plain_text(document);
    let html = content::render_html(document);
    let excerpt = explicit_excerpt.or_else(|| auto_excerpt(&text));
    (text, html, excerpt)
}

fn check_document(document: &Value) -> AppResult<()> {
    content::validate_document(document).map_err(|e| AppError::validation(format!("content: {e}")))
}

async fn check_labels(repo: &dyn Repository, label_ids: &[Uuid]) -> AppResult<()> {
    for id in label_ids {
        if repo.get_label(*id).await?.is_none() {
            return Err(AppError::validation(format!("label_ids: unknown label {id}")));
        }
    }
    Ok(())
}

/// Validated, collision-free slug. An explicit slug must be valid as given;
/// otherwise one is derived from the title.
async fn resolve_slug(
    repo: &dyn Repository,
    requested: Option<&str>,
    title: &str,
    exclude: Option<Uuid>,
) -> AppResult<String> {
    let base = match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(explicit) => {
            slug::validate_slug(explicit)?;
            explicit.to_string()
        }
        None => slug::slugify(title),
    };
    Ok(slug::unique_slug(repo, &base, exclude).await?)
}

async fn reload(repo: &dyn Repository, id: Uuid) -> AppResult<Post> {
    repo.get_post(id).await?.ok_or(AppError::NotFound("post"))
}

/// list_published_posts
///
/// [Public Route] Published posts, newest first.
#[utoipa::path(
    get,
    path = "/posts",
    params(PostListQuery),
    responses((status = 200, description = "Published posts", body = [PostSummary]))
)]
pub async fn list_published_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<Vec<PostSummary>>> {
    let filter = query.into_filter(Some(PostStatus::Published));
    let posts = state.repo.list_posts(&filter).await?;
    Ok(Json(posts.into_iter().map(PostSummary::from).collect()))
}

/// get_published_post
///
/// [Public Route] Drafts are reported as missing.
#[utoipa::path(
    get,
    path = "/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_published_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Post>> {
    state
        .repo
        .get_post_by_slug(&slug)
        .await?
        .filter(|post| post.status == PostStatus::Published)
        .map(Json)
        .ok_or(AppError::NotFound("post"))
}

/// list_posts
///
/// [Admin Route] Every post, optionally filtered by `status`.
#[utoipa::path(
    get,
    path = "/admin/posts",
    params(PostListQuery),
    responses((status = 200, description = "All posts", body = [PostSummary]))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<Vec<PostSummary>>> {
    let status = query.status;
    let posts = state.repo.list_posts(&query.into_filter(status)).await?;
    Ok(Json(posts.into_iter().map(PostSummary::from).collect()))
}

/// get_post
///
/// [Admin Route] Full post including drafts.
#[utoipa::path(
    get,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 200, description = "Found", body = Post), (status = 404, description = "Not Found"))
)]
pub async fn get_post(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Post>> {
    Ok(Json(reload(state.repo.as_ref(), id).await?))
}

/// create_post
///
/// [Admin Route] Creates a post. The slug is derived from the title when not
/// given and suffixed until unique; text, HTML and excerpt are derived from
/// the content and the image usage index is updated.
#[utoipa::path(
    post,
    path = "/admin/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 422, description = "Invalid title, slug, content or labels")
    )
)]
pub async fn create_post(
    AdminUser(author): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let repo = state.repo.as_ref();

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("title is required"));
    }
    check_document(&payload.content)?;
    check_labels(repo, &payload.label_ids).await?;

    let slug = resolve_slug(repo, payload.slug.as_deref(), &title, None).await?;
    let (content_text, content_html, excerpt) =
        derive(&payload.content, non_empty(payload.excerpt));

    let post = repo
        .insert_post(NewPost {
            author_id: Some(author.id),
            title,
            slug,
            content: payload.content,
            content_text,
            content_html,
            excerpt,
            cover_image: non_empty(payload.cover_image),
            status: payload.status,
            published_at: (payload.status == PostStatus::Published).then(Utc::now),
        })
        .await?;

    if !payload.label_ids.is_empty() {
        repo.set_post_labels(post.id, &payload.label_ids).await?;
    }
    images::track_post(repo, &post).await?;

    tracing::info!(post_id = %post.id, slug = %post.slug, "post created");
    Ok((StatusCode::CREATED, Json(reload(repo, post.id).await?)))
}

/// update_post
///
/// [Admin Route] Partial update. Changing the slug re-validates it; changing
/// the content re-derives text and HTML and re-syncs the image usage index.
#[utoipa::path(
    put,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "Not Found"),
        (status = 422, description = "Invalid field")
    )
)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let repo = state.repo.as_ref();
    let existing = reload(repo, id).await?;

    let title = match payload.title {
        Some(title) if title.trim().is_empty() => {
            return Err(AppError::validation("title is required"));
        }
        Some(title) => title.trim().to_string(),
        None => existing.title.clone(),
    };

    let slug = match payload.slug.as_deref().map(str::trim) {
        Some(requested) if requested != existing.slug => {
            resolve_slug(repo, Some(requested), &title, Some(id)).await?
        }
        _ => existing.slug.clone(),
    };

    if let Some(ids) = &payload.label_ids {
        check_labels(repo, ids).await?;
    }

    // An excerpt that was auto-derived follows the content; an explicit one sticks.
    let was_derived = existing.excerpt == auto_excerpt(&existing.content_text);
    let (content, content_text, content_html, excerpt) = match payload.content {
        Some(document) => {
            check_document(&document)?;
            let explicit = match payload.excerpt {
                Some(excerpt) => non_empty(Some(excerpt)),
                None if was_derived => None,
                None => existing.excerpt.clone(),
            };
            let (text, html, excerpt) = derive(&document, explicit);
            (document, text, html, excerpt)
        }
        None => {
            let excerpt = match payload.excerpt {
                Some(excerpt) => {
                    non_empty(Some(excerpt)).or_else(|| auto_excerpt(&existing.content_text))
                }
                None => existing.excerpt.clone(),
            };
            (
                existing.content.clone(),
                existing.content_text.clone(),
                existing.content_html.clone(),
                excerpt,
            )
        }
    };

    let status = payload.status.unwrap_or(existing.status);
    let published_at = match status {
        PostStatus::Published => existing.published_at.or_else(|| Some(Utc::now())),
        PostStatus::Draft => existing.published_at,
    };

    let cover_image = match payload.cover_image {
        Some(cover) => non_empty(Some(cover)),
        None => existing.cover_image.clone(),
    };

    let post = repo
        .update_post(
            id,
            NewPost {
                author_id: existing.author_id,
                title,
                slug,
                content,
                content_text,
                content_html,
                excerpt,
                cover_image,
                status,
                published_at,
            },
        )
        .await?
        .ok_or(AppError::NotFound("post"))?;

    if let Some(ids) = &payload.label_ids {
        repo.set_post_labels(id, ids).await?;
    }
    images::track_post(repo, &post).await?;

    Ok(Json(reload(repo, id).await?))
}

/// set_post_status
///
/// [Admin Route] Publish or unpublish. Publishing keeps an earlier `published_at`.
#[utoipa::path(
    put,
    path = "/admin/posts/{id}/status",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = StatusRequest,
    responses((status = 200, description = "Updated", body = Post), (status = 404, description = "Not Found"))
)]
pub async fn set_post_status(
    state: State<AppState>,
    path: Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<Post>> {
    update_post(
        state,
        path,
        Json(UpdatePostRequest {
            status: Some(payload.status),
            ..UpdatePostRequest::default()
        }),
    )
    .await
}

/// set_post_labels
///
/// [Admin Route] Replaces the post's label set.
#[utoipa::path(
    put,
    path = "/admin/posts/{id}/labels",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = SetLabelsRequest,
    responses((status = 200, description = "Updated", body = Post), (status = 404, description = "Not Found"))
)]
pub async fn set_post_labels(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetLabelsRequest>,
) -> AppResult<Json<Post>> {
    let repo = state.repo.as_ref();
    reload(repo, id).await?;
    check_labels(repo, &payload.label_ids).await?;
    repo.set_post_labels(id, &payload.label_ids).await?;
    Ok(Json(reload(repo, id).await?))
}

/// delete_post
///
/// [Admin Route] Removes the post with its label links and image usage rows.
#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.delete_post(id).await? {
        tracing::info!(post_id = %id, "post deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("post"))
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SlugCheckQuery {
    pub slug: String,
    /// Post whose own slug does not count as taken.
    pub exclude: Option<Uuid>,
}

/// check_slug
///
/// [Admin Route] Lets the editor validate a slug while it is typed.
#[utoipa::path(
    get,
    path = "/admin/slugs/check",
    params(SlugCheckQuery),
    responses((status = 200, description = "Slug report", body = SlugCheckResponse))
)]
pub async fn check_slug(
    State(state): State<AppState>,
    Query(query): Query<SlugCheckQuery>,
) -> AppResult<Json<SlugCheckResponse>> {
    let repo = state.repo.as_ref();
    let requested = query.slug.trim().to_string();

    let (valid, error) = match slug::validate_slug(&requested) {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    let available = valid && !repo.post_slug_taken(&requested, query.exclude).await?;

    let base = if valid {
        requested.clone()
    } else {
        slug::slugify(&requested)
    };
    let suggestion = slug::unique_slug(repo, &base, query.exclude).await?;

    Ok(Json(SlugCheckResponse {
        slug: requested,
        valid,
        available,
        error,
        suggestion,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_excerpt_wins() {
        let doc = json!({"type": "doc", "content": [
            {"type": "paragraph", "content": [{"type": "text", "text": "Body text"}]}
        ]});
        let (text, html, excerpt) = derive(&doc, Some("Hand written".to_string()));
        assert_eq!(text, "Body text");
        assert_eq!(html, "<p>Body text</p>");
        assert_eq!(excerpt.as_deref(), Some("Hand written"));

        let (_, _, excerpt) = derive(&doc, None);
        assert_eq!(excerpt.as_deref(), Some("Body text"));
    }

    #[test]
    fn empty_document_has_no_excerpt() {
        let (_, _, excerpt) = derive(&json!({"type": "doc", "content": []}), None);
        assert_eq!(excerpt, None);
    }
}
