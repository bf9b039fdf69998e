use std::future::Future;
use std::sync::Arc;

use auth_check::{Session, UserInfo};
use chrono::Utc;

use crate::cdn::MediaCdn;
use crate::config::BunnyConfig;
use crate::db::{NewVideo, VideoStore};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::feed::FeedCache;
use crate::model::{FinalizedVideo, ThumbnailUploadSlot, VideoDetails, VideoUploadSlot, Visibility};
use crate::rate_limit::{RateLimitDecision, RateLimiter};

/// Title of the placeholder video until the uploader finalizes it.
pub const PLACEHOLDER_TITLE: &str = "Temporary Title";

/// Hands out direct-to-CDN upload credentials and records finished uploads.
///
/// The video and thumbnail bytes never pass through this service: the uploader PUTs them to the
/// URLs returned by the two slot operations and then calls [`UploadOrchestrator::finalize_video_record`].
pub struct UploadOrchestrator {
    cdn: Arc<dyn MediaCdn>,
    store: Arc<dyn VideoStore>,
    limiter: Arc<dyn RateLimiter>,
    feed_cache: Arc<FeedCache>,
    bunny: BunnyConfig,
}

/// Finalize request after validation.
struct ValidDetails {
    video_id: String,
    title: String,
    description: String,
    thumbnail_url: String,
    visibility: Visibility,
    duration: Option<i32>,
}

impl UploadOrchestrator {
    pub fn new(
        cdn: Arc<dyn MediaCdn>,
        store: Arc<dyn VideoStore>,
        limiter: Arc<dyn RateLimiter>,
        feed_cache: Arc<FeedCache>,
        bunny: BunnyConfig,
    ) -> Self {
        UploadOrchestrator { cdn, store, limiter, feed_cache, bunny }
    }

    pub async fn request_video_upload_slot(&self, session: &Session) -> AppResult<VideoUploadSlot> {
        logged("request_video_upload_slot", async {
            require_user(session)?;

            let video = self.cdn.create_video(PLACEHOLDER_TITLE).await?;
            tracing::info!("Created placeholder video {}", video.guid);

            Ok(VideoUploadSlot {
                upload_url: self.bunny.video_url(&video.guid),
                video_id: video.guid,
                access_key: self.bunny.stream_access_key.clone(),
            })
        })
        .await
    }

    pub async fn request_thumbnail_upload_slot(&self, video_id: &str) -> AppResult<ThumbnailUploadSlot> {
        logged("request_thumbnail_upload_slot", async {
            validate_video_id(video_id)?;

            let file_name = thumbnail_file_name(Utc::now().timestamp_millis(), video_id);
            Ok(ThumbnailUploadSlot {
                upload_url: self.bunny.thumbnail_upload_url(&file_name),
                cdn_url: self.bunny.thumbnail_cdn_url(&file_name),
                access_key: self.bunny.storage_access_key.clone(),
            })
        })
        .await
    }

    pub async fn finalize_video_record(&self, session: &Session, details: VideoDetails) -> AppResult<FinalizedVideo> {
        logged("finalize_video_record", async {
            let details = validate_details(details)?;
            let user = require_user(session)?;

            if let RateLimitDecision::Denied { retry_after } = self.limiter.check(&user.user_id).await {
                return Err(AppError::RateLimit {
                    retry_after_secs: retry_after.as_secs_f64().ceil() as u64,
                });
            }

            // the intent lets the reconciliation sweep clean up if anything below fails
            self.store.record_intent(&details.video_id, &user.user_id).await?;

            self.cdn
                .update_video(&details.video_id, &details.title, &details.description)
                .await?;

            let now = Utc::now();
            self.store
                .complete_upload(NewVideo {
                    video_url: self.bunny.embed_video_url(&details.video_id),
                    video_id: details.video_id.clone(),
                    title: details.title,
                    description: details.description,
                    visibility: details.visibility.as_str().to_string(),
                    user_id: user.user_id.clone(),
                    thumbnail_url: details.thumbnail_url,
                    duration: details.duration,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            self.feed_cache.invalidate();
            tracing::info!("Video {} saved for user {}", details.video_id, user.user_id);

            Ok(FinalizedVideo { video_id: details.video_id })
        })
        .await
    }
}

/// Runs an operation body and logs its failure, if any, before handing the error back.
async fn logged<T>(operation: &'static str, body: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    let result = body.await;
    if let Err(err) = &result {
        match err.kind() {
            ErrorKind::Validation | ErrorKind::Authentication | ErrorKind::RateLimit => {
                tracing::warn!("{} rejected ({:?}): {}", operation, err.kind(), err)
            }
            _ => tracing::error!("{} failed ({:?}): {}", operation, err.kind(), err),
        }
    }
    result
}

fn require_user(session: &Session) -> AppResult<&UserInfo> {
    session.user().ok_or(AppError::Authentication)
}

/// `{millis}-{video_id}-thumbnail`. Two requests for the same video within one millisecond get the same name.
pub fn thumbnail_file_name(unix_millis: i64, video_id: &str) -> String {
    format!("{}-{}-thumbnail", unix_millis, video_id)
}

// video ids end up in CDN paths, so only allow what Bunny guids are made of
fn validate_video_id(video_id: &str) -> AppResult<()> {
    if video_id.is_empty() {
        return Err(AppError::validation("Video id is required"));
    }
    if !video_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::validation(format!("Invalid video id: {video_id}")));
    }
    Ok(())
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::validation(format!("{field} is required")))
}

fn validate_details(details: VideoDetails) -> AppResult<ValidDetails> {
    validate_video_id(details.video_id.trim())?;

    let title = required(details.title, "Title")?;
    let description = required(details.description, "Description")?;
    let thumbnail_url = required(details.thumbnail_url, "Thumbnail URL")?;

    let visibility = match details.visibility.as_deref() {
        Some(value) => Visibility::parse(value)?,
        None => Visibility::Public,
    };

    let duration = match details.duration {
        Some(seconds) if !seconds.is_finite() || seconds < 0.0 => {
            return Err(AppError::validation("Duration must be a non-negative number of seconds"));
        }
        Some(seconds) => Some(seconds.round().min(i32::MAX as f64) as i32),
        None => None,
    };

    Ok(ValidDetails {
        video_id: details.video_id.trim().to_string(),
        title,
        description,
        thumbnail_url,
        visibility,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::cdn::test_bunny_config;
    use crate::db::IntentStatus;
    use crate::feed::{FeedPage, FeedParams, FeedQuery, Pagination};
    use crate::rate_limit::FixedWindowLimiter;
    use crate::testing::{signed_in, CdnCall, FakeCdn, MemoryVideoStore};

    struct Harness {
        cdn: Arc<FakeCdn>,
        store: Arc<MemoryVideoStore>,
        feed_cache: Arc<FeedCache>,
        uploads: UploadOrchestrator,
    }

    fn harness(cdn: FakeCdn) -> Harness {
        let cdn = Arc::new(cdn);
        let store = Arc::new(MemoryVideoStore::default());
        let feed_cache = Arc::new(FeedCache::new());
        let uploads = UploadOrchestrator::new(
            cdn.clone(),
            store.clone(),
            Arc::new(FixedWindowLimiter::new(2, Duration::from_secs(60))),
            feed_cache.clone(),
            test_bunny_config("https://video.bunnycdn.com"),
        );
        Harness { cdn, store, feed_cache, uploads }
    }

    fn details(video_id: &str) -> VideoDetails {
        VideoDetails {
            video_id: video_id.to_string(),
            title: Some("Cats at play".to_string()),
            description: Some("Two cats and a ball of yarn".to_string()),
            thumbnail_url: Some(format!("https://zone.b-cdn.net/thumbnails/1-{video_id}-thumbnail")),
            visibility: Some("private".to_string()),
            duration: Some(61.6),
        }
    }

    #[tokio::test]
    async fn video_slot_requires_a_session() {
        let h = harness(FakeCdn::default());

        let err = h.uploads.request_video_upload_slot(&Session::anonymous()).await.unwrap_err();

        assert!(matches!(err, AppError::Authentication));
        assert!(h.cdn.calls().is_empty());
    }

    #[tokio::test]
    async fn video_slot_creates_placeholder() {
        let h = harness(FakeCdn::default());

        let slot = h.uploads.request_video_upload_slot(&signed_in("alice")).await.unwrap();

        assert_eq!(slot.video_id, "video-1");
        assert_eq!(slot.upload_url, "https://video.bunnycdn.com/library/4242/videos/video-1");
        assert_eq!(slot.access_key, "stream-key");
        assert_eq!(h.cdn.calls(), vec![CdnCall::Create(PLACEHOLDER_TITLE.to_string())]);
    }

    #[tokio::test]
    async fn video_slot_surfaces_cdn_failure() {
        let h = harness(FakeCdn::failing(500));

        let err = h.uploads.request_video_upload_slot(&signed_in("alice")).await.unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn thumbnail_slot_is_built_locally() {
        let h = harness(FakeCdn::default());

        let slot = h.uploads.request_thumbnail_upload_slot("video-1").await.unwrap();

        let file_name = slot.cdn_url.rsplit('/').next().unwrap().to_string();
        assert!(file_name.ends_with("-video-1-thumbnail"));
        assert_eq!(slot.upload_url, format!("https://video.bunnycdn.com/storage/thumbnails/{file_name}"));
        assert_eq!(slot.access_key, "storage-key");
        assert!(h.cdn.calls().is_empty());
    }

    #[tokio::test]
    async fn thumbnail_slot_rejects_path_like_ids() {
        let h = harness(FakeCdn::default());

        for bad in ["", "../etc", "a/b", "id with space"] {
            let err = h.uploads.request_thumbnail_upload_slot(bad).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{bad:?}");
        }
    }

    #[test]
    fn same_millisecond_thumbnail_names_collide() {
        let first = thumbnail_file_name(1_700_000_000_000, "v1");
        let second = thumbnail_file_name(1_700_000_000_000, "v1");
        let later = thumbnail_file_name(1_700_000_000_001, "v1");

        assert_eq!(first, second);
        assert_ne!(first, later);
    }

    #[tokio::test]
    async fn finalize_without_title_fails_before_any_io() {
        let h = harness(FakeCdn::default());
        let mut request = details("v1");
        request.title = None;

        let err = h.uploads.finalize_video_record(&signed_in("alice"), request).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ref message) if message == "Title is required"));
        assert!(h.cdn.calls().is_empty());
        assert_eq!(h.store.intent_status("v1"), None);
    }

    #[tokio::test]
    async fn finalize_validates_visibility_and_duration() {
        let h = harness(FakeCdn::default());

        let mut request = details("v1");
        request.visibility = Some("unlisted".to_string());
        assert!(matches!(
            h.uploads.finalize_video_record(&signed_in("alice"), request).await,
            Err(AppError::Validation(_))
        ));

        let mut request = details("v1");
        request.duration = Some(f64::NAN);
        assert!(matches!(
            h.uploads.finalize_video_record(&signed_in("alice"), request).await,
            Err(AppError::Validation(_))
        ));
        assert!(h.cdn.calls().is_empty());
    }

    #[tokio::test]
    async fn finalize_requires_a_session() {
        let h = harness(FakeCdn::default());

        let err = h.uploads.finalize_video_record(&Session::anonymous(), details("v1")).await.unwrap_err();

        assert!(matches!(err, AppError::Authentication));
        assert!(h.cdn.calls().is_empty());
    }

    #[tokio::test]
    async fn finalize_updates_cdn_and_stores_video() {
        let h = harness(FakeCdn::default());
        let query = FeedQuery::compose(None, &FeedParams::default());
        let empty = FeedPage { videos: vec![], pagination: Pagination::new(1, 8, 0) };
        h.feed_cache.insert(query.clone(), empty, h.feed_cache.generation());

        let saved = h.uploads.finalize_video_record(&signed_in("alice"), details("v1")).await.unwrap();

        assert_eq!(saved, FinalizedVideo { video_id: "v1".to_string() });
        assert_eq!(h.cdn.calls(), vec![CdnCall::Update {
            video_id: "v1".to_string(),
            title: "Cats at play".to_string(),
            description: "Two cats and a ball of yarn".to_string(),
        }]);

        let videos = h.store.videos();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].user_id, "alice");
        assert_eq!(videos[0].visibility, "private");
        assert_eq!(videos[0].duration, Some(62));
        assert_eq!(videos[0].video_url, "https://iframe.mediadelivery.net/embed/4242/v1");
        assert_eq!(h.store.intent_status("v1").as_deref(), Some(IntentStatus::Completed.as_str()));
        assert!(h.feed_cache.get(&query).is_none());
    }

    #[tokio::test]
    async fn repeated_finalize_stops_before_the_cdn() {
        let h = harness(FakeCdn::default());
        let alice = signed_in("alice");
        h.uploads.finalize_video_record(&alice, details("v1")).await.unwrap();

        let mut retitled = details("v1");
        retitled.title = Some("Another title".to_string());
        let err = h.uploads.finalize_video_record(&alice, retitled).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ref message) if message == "Video v1 is already saved"));
        assert_eq!(h.cdn.calls().len(), 1);
        assert_eq!(h.store.videos()[0].title, "Cats at play");
        assert_eq!(h.store.intent_status("v1").as_deref(), Some(IntentStatus::Completed.as_str()));
    }

    #[tokio::test]
    async fn failed_cdn_update_leaves_pending_intent() {
        let h = harness(FakeCdn::failing(502));

        let err = h.uploads.finalize_video_record(&signed_in("alice"), details("v1")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(h.store.videos().is_empty());
        assert_eq!(h.store.intent_status("v1").as_deref(), Some(IntentStatus::Pending.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn third_finalize_in_a_minute_is_rate_limited() {
        let h = harness(FakeCdn::default());
        let alice = signed_in("alice");

        h.uploads.finalize_video_record(&alice, details("v1")).await.unwrap();
        h.uploads.finalize_video_record(&alice, details("v2")).await.unwrap();
        let err = h.uploads.finalize_video_record(&alice, details("v3")).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimit { retry_after_secs: 60 }));
        assert_eq!(h.store.intent_status("v3"), None);

        // another caller has their own quota
        h.uploads.finalize_video_record(&signed_in("bob"), details("v4")).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        h.uploads.finalize_video_record(&alice, details("v3")).await.unwrap();
    }
}
