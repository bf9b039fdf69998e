use std::sync::Arc;

use auth_check::{session_middleware, Session, SessionResolver};
use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::db::VideoStore;
use crate::error::AppResult;
use crate::feed::{list_videos, FeedCache, FeedPage, FeedParams, FeedQuery};
use crate::model::{ThumbnailUploadSlot, VideoDetails, VideoUploadSlot};
use crate::upload::UploadOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadOrchestrator>,
    pub store: Arc<dyn VideoStore>,
    pub feed_cache: Arc<FeedCache>,
}

pub fn router(state: AppState, sessions: Arc<dyn SessionResolver>) -> Router {
    Router::new()
        .route("/videos/health", get(|| async { "OK" }))
        .route("/videos/upload-url", post(request_video_upload_slot))
        .route("/videos/{video_id}/thumbnail-upload-url", post(request_thumbnail_upload_slot))
        .route("/videos", post(finalize_video_record).get(list_feed))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(sessions, session_middleware))
        )
}

async fn request_video_upload_slot(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> AppResult<Json<VideoUploadSlot>> {
    let slot = state.uploads.request_video_upload_slot(&session).await?;
    Ok(Json(slot))
}

async fn request_thumbnail_upload_slot(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<ThumbnailUploadSlot>> {
    let slot = state.uploads.request_thumbnail_upload_slot(&video_id).await?;
    Ok(Json(slot))
}

async fn finalize_video_record(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(details): Json<VideoDetails>,
) -> AppResult<impl IntoResponse> {
    let saved = state.uploads.finalize_video_record(&session, details).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Feed of the videos visible to the caller, served from the feed cache when possible.
async fn list_feed(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<FeedPage>> {
    let query = FeedQuery::compose(session.user_id(), &params);
    if let Some(page) = state.feed_cache.get(&query) {
        return Ok(Json(page));
    }

    let generation = state.feed_cache.generation();
    let page = list_videos(state.store.as_ref(), query.clone()).await?;
    state.feed_cache.insert(query, page.clone(), generation);
    Ok(Json(page))
}
