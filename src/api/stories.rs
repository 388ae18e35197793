use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::app::AppState;
use crate::db::models::{InsertAck, Story, TimeSpentAck, UpdateTimeRequest, DEFAULT_BRANCH};
use crate::db::repository::StoryRepository;
use crate::error::AppError;

/// Query parameters for `GET /api/stories`.
#[derive(Debug, Default, Deserialize)]
pub struct ListStoriesQuery {
    pub email: Option<String>,
}

/// Query parameters for `GET /api/stories/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct FetchBranchQuery {
    pub branch: Option<String>,
}

/// Branch names end up inside a dot-separated field path, so they must be a
/// single plain path segment.
fn validate_branch_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::BadRequest("Branch name cannot be empty".into()));
    }
    if name.contains('.') || name.starts_with('$') {
        return Err(AppError::BadRequest(format!(
            "Invalid branch name '{}': must not contain '.' or start with '$'",
            name
        )));
    }
    Ok(())
}

fn parse_story_id(id: &str) -> Result<ObjectId, AppError> {
    Ok(ObjectId::parse_str(id)?)
}

/// Lists stories.
///
/// With a non-empty `email`, returns every field of the stories written by
/// that author. Otherwise returns all stories reduced to their summary and
/// default branch.
pub async fn process_list_stories(
    repo: &dyn StoryRepository,
    email: Option<&str>,
) -> Result<Vec<Story>, AppError> {
    match email.filter(|e| !e.is_empty()) {
        Some(email) => repo.find_by_author_email(email).await,
        None => repo.list_summaries().await,
    }
}

/// Stores a story document without schema checks.
///
/// A client-supplied `_id` is discarded so the store always generates the
/// identifier.
pub async fn process_create_story(
    repo: &dyn StoryRepository,
    body: serde_json::Value,
) -> Result<InsertAck, AppError> {
    if !body.is_object() {
        return Err(AppError::BadRequest(
            "Story body must be a JSON object".into(),
        ));
    }

    let mut story = bson::to_document(&body)
        .map_err(|e| AppError::BadRequest(format!("Story body is not storable: {}", e)))?;

    if story.remove("_id").is_some() {
        tracing::debug!("Discarding client-supplied _id on story create");
    }

    // The store treats top-level `$` keys as operators.
    if let Some(key) = story.keys().find(|key| key.starts_with('$')) {
        return Err(AppError::BadRequest(format!(
            "Story field '{}' must not start with '$'",
            key
        )));
    }

    let id = repo.insert(story).await?;
    tracing::info!(story_id = %id, "Story created");

    Ok(InsertAck {
        acknowledged: true,
        inserted_id: id.to_hex(),
    })
}

/// Serves one branch of a story and counts the view.
///
/// Every call increments `layers.<branch>.views`, so this is not idempotent.
pub async fn process_fetch_branch(
    repo: &dyn StoryRepository,
    id: &str,
    branch: Option<&str>,
) -> Result<Story, AppError> {
    let id = parse_story_id(id)?;
    let branch = branch.unwrap_or(DEFAULT_BRANCH);
    validate_branch_name(branch)?;

    repo.increment_views(id, branch).await?.ok_or_else(|| {
        tracing::debug!(story_id = %id, "Fetch for unknown story");
        AppError::NotFound(format!("Story '{}' not found", id))
    })
}

/// Accumulates reading time on a branch and acknowledges the new total.
pub async fn process_update_time(
    repo: &dyn StoryRepository,
    id: &str,
    request: UpdateTimeRequest,
) -> Result<TimeSpentAck, AppError> {
    let id = parse_story_id(id)?;
    validate_branch_name(&request.branch_name)?;

    let total = repo
        .add_time_spent(id, &request.branch_name, request.time_spent)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Story '{}' not found", id)))?;

    Ok(TimeSpentAck {
        acknowledged: true,
        branch_name: request.branch_name,
        time_spent: total,
    })
}

/// Axum handler for `GET /api/stories`.
pub async fn list_stories_handler(
    State(state): State<AppState>,
    Query(query): Query<ListStoriesQuery>,
) -> Result<Json<Vec<Story>>, AppError> {
    let stories = process_list_stories(state.story_repo.as_ref(), query.email.as_deref()).await?;
    Ok(Json(stories))
}

/// Axum handler for `POST /api/stories`.
pub async fn create_story_handler(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<InsertAck>, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let ack = process_create_story(state.story_repo.as_ref(), body).await?;
    Ok(Json(ack))
}

/// Axum handler for `GET /api/stories/{id}`.
pub async fn fetch_branch_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FetchBranchQuery>,
) -> Result<Json<Story>, AppError> {
    let story =
        process_fetch_branch(state.story_repo.as_ref(), &id, query.branch.as_deref()).await?;
    Ok(Json(story))
}

/// Axum handler for `POST /api/stories/{id}/updateTime`.
pub async fn update_time_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateTimeRequest>, JsonRejection>,
) -> Result<Json<TimeSpentAck>, AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let ack = process_update_time(state.story_repo.as_ref(), &id, request).await?;
    Ok(Json(ack))
}
