//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use auth_check::{session_token, Session, SessionError, SessionResolver, UserInfo};
use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::cdn::{CdnVideo, MediaCdn};
use crate::db::{already_saved, Author, FeedRow, IntentStatus, NewVideo, UploadIntent, Video, VideoStore};
use crate::error::{AppError, AppResult};
use crate::feed::{FeedQuery, SortOrder};
use crate::model::Visibility;

pub fn signed_in(user_id: &str) -> Session {
    Session(Some(UserInfo { user_id: user_id.to_string() }))
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn video(video_id: &str, title: &str, visibility: Visibility, user_id: &str) -> Video {
    Video {
        video_id: video_id.to_string(),
        title: title.to_string(),
        description: format!("About {title}"),
        visibility: visibility.as_str().to_string(),
        user_id: user_id.to_string(),
        video_url: format!("https://iframe.mediadelivery.net/embed/4242/{video_id}"),
        thumbnail_url: format!("https://zone.b-cdn.net/thumbnails/0-{video_id}-thumbnail"),
        duration: Some(42),
        views: 0,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnCall {
    Create(String),
    Update { video_id: String, title: String, description: String },
    Delete(String),
}

/// Records every call; fails all of them with `fail_status` when set.
#[derive(Default)]
pub struct FakeCdn {
    calls: Mutex<Vec<CdnCall>>,
    fail_status: Mutex<Option<u16>>,
    unknown: Mutex<HashSet<String>>,
}

impl FakeCdn {
    pub fn failing(status: u16) -> Self {
        let cdn = FakeCdn::default();
        cdn.fail_with(Some(status));
        cdn
    }

    pub fn fail_with(&self, status: Option<u16>) {
        *self.fail_status.lock() = status;
    }

    /// Makes deletes of `video_id` report that the CDN never had it.
    pub fn forget(&self, video_id: &str) {
        self.unknown.lock().insert(video_id.to_string());
    }

    pub fn calls(&self) -> Vec<CdnCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: CdnCall) -> AppResult<()> {
        self.calls.lock().push(call);
        match *self.fail_status.lock() {
            Some(status) => Err(AppError::Upstream { status, body: "fake failure".to_string() }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MediaCdn for FakeCdn {
    async fn create_video(&self, title: &str) -> AppResult<CdnVideo> {
        self.record(CdnCall::Create(title.to_string()))?;
        let n = self.calls.lock().len();
        Ok(CdnVideo { guid: format!("video-{n}") })
    }

    async fn update_video(&self, video_id: &str, title: &str, description: &str) -> AppResult<()> {
        self.record(CdnCall::Update {
            video_id: video_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        })
    }

    async fn delete_video(&self, video_id: &str) -> AppResult<bool> {
        self.record(CdnCall::Delete(video_id.to_string()))?;
        Ok(!self.unknown.lock().contains(video_id))
    }
}

/// Mirrors the predicates, ordering and paging of the PostgreSQL store.
#[derive(Default)]
pub struct MemoryVideoStore {
    videos: Mutex<Vec<Video>>,
    authors: Mutex<Vec<Author>>,
    intents: Mutex<HashMap<String, UploadIntent>>,
}

impl MemoryVideoStore {
    pub fn with_videos(videos: Vec<Video>) -> Self {
        let store = MemoryVideoStore::default();
        *store.videos.lock() = videos;
        store
    }

    pub fn add_author(&self, id: &str, name: &str, image: Option<&str>) {
        self.authors.lock().push(Author {
            id: id.to_string(),
            name: name.to_string(),
            image: image.map(str::to_string),
        });
    }

    pub fn insert_intent(&self, video_id: &str, user_id: &str, status: IntentStatus, updated_at: DateTime<Utc>) {
        self.intents.lock().insert(video_id.to_string(), UploadIntent {
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            status: status.as_str().to_string(),
            created_at: updated_at,
            updated_at,
        });
    }

    pub fn intent_status(&self, video_id: &str) -> Option<String> {
        self.intents.lock().get(video_id).map(|intent| intent.status.clone())
    }

    pub fn videos(&self) -> Vec<Video> {
        self.videos.lock().clone()
    }

    fn visible(query: &FeedQuery, video: &Video) -> bool {
        let visible = video.visibility == Visibility::Public.as_str()
            || query.viewer.as_deref() == Some(video.user_id.as_str());
        let matches = match query.title_pattern.as_deref() {
            // compose always wraps the escaped needle in %...%
            Some(pattern) => {
                let needle = pattern
                    .trim_start_matches('%')
                    .trim_end_matches('%')
                    .replace("\\%", "%")
                    .replace("\\_", "_")
                    .replace("\\\\", "\\")
                    .to_lowercase();
                video.title.to_lowercase().contains(&needle)
            }
            None => true,
        };
        visible && matches
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn record_intent(&self, video_id: &str, user_id: &str) -> AppResult<()> {
        if self.intent_status(video_id).as_deref() == Some(IntentStatus::Completed.as_str()) {
            return Err(already_saved(video_id));
        }
        self.insert_intent(video_id, user_id, IntentStatus::Pending, Utc::now());
        Ok(())
    }

    async fn complete_upload(&self, video: NewVideo) -> AppResult<()> {
        let mut videos = self.videos.lock();
        if videos.iter().any(|existing| existing.video_id == video.video_id) {
            return Err(AppError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new(format!("duplicate video {}", video.video_id)),
            )));
        }

        videos.push(Video {
            video_id: video.video_id.clone(),
            title: video.title,
            description: video.description,
            visibility: video.visibility,
            user_id: video.user_id,
            video_url: video.video_url,
            thumbnail_url: video.thumbnail_url,
            duration: video.duration,
            views: 0,
            created_at: video.created_at,
            updated_at: video.updated_at,
        });

        if let Some(intent) = self.intents.lock().get_mut(&video.video_id) {
            intent.status = IntentStatus::Completed.as_str().to_string();
        }
        Ok(())
    }

    async fn list_feed(&self, query: FeedQuery) -> AppResult<(Vec<FeedRow>, i64)> {
        let mut matching: Vec<Video> = self
            .videos
            .lock()
            .iter()
            .filter(|video| Self::visible(&query, video))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let primary = match query.sort {
                SortOrder::MostRecent => b.created_at.cmp(&a.created_at),
                SortOrder::OldestFirst => a.created_at.cmp(&b.created_at),
                SortOrder::MostViewed => b.views.cmp(&a.views),
                SortOrder::LeastViewed => a.views.cmp(&b.views),
            };
            primary.then_with(|| a.video_id.cmp(&b.video_id))
        });

        let total = matching.len() as i64;
        let authors = self.authors.lock();
        let rows = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .map(|video| {
                let author = authors.iter().find(|author| author.id == video.user_id).cloned();
                (video, author)
            })
            .collect();

        Ok((rows, total))
    }

    async fn stale_intents(&self, older_than: DateTime<Utc>) -> AppResult<Vec<UploadIntent>> {
        let mut stale: Vec<UploadIntent> = self
            .intents
            .lock()
            .values()
            .filter(|intent| intent.status == IntentStatus::Pending.as_str() && intent.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stale)
    }

    async fn video_exists(&self, video_id: &str) -> AppResult<bool> {
        Ok(self.videos.lock().iter().any(|video| video.video_id == video_id))
    }

    async fn set_intent_status(&self, video_id: &str, status: IntentStatus) -> AppResult<()> {
        if let Some(intent) = self.intents.lock().get_mut(video_id) {
            intent.status = status.as_str().to_string();
            intent.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Treats the bearer token (or session cookie) as the user id; no token means anonymous.
pub struct TokenIsUserResolver;

#[async_trait]
impl SessionResolver for TokenIsUserResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserInfo>, SessionError> {
        Ok(session_token(headers).map(|user_id| UserInfo { user_id }))
    }
}
