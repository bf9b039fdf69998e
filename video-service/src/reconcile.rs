use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cdn::MediaCdn;
use crate::db::{IntentStatus, UploadIntent, VideoStore};
use crate::error::{AppError, AppResult};

/// Outcome of one sweep over the stale upload intents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub completed: usize,
    pub abandoned: usize,
    pub failed: usize,
}

/// Settles every pending intent untouched for longer than `grace`.
///
/// An intent whose video row exists only lost its status update and is marked completed. Otherwise the
/// finalize never made it to the database, so the CDN video is deleted and the intent abandoned. Intents
/// that fail to settle stay pending for the next sweep.
pub async fn reconcile_once(store: &dyn VideoStore, cdn: &dyn MediaCdn, grace: Duration) -> AppResult<ReconcileReport> {
    let grace = chrono::Duration::from_std(grace)
        .map_err(|err| AppError::Internal(format!("invalid intent grace period: {err}")))?;
    let intents = store.stale_intents(Utc::now() - grace).await?;

    let mut report = ReconcileReport::default();
    for intent in intents {
        match settle(store, cdn, &intent).await {
            Ok(IntentStatus::Completed) => report.completed += 1,
            Ok(_) => report.abandoned += 1,
            Err(err) => {
                tracing::error!("Failed to reconcile upload of video {}: {}", intent.video_id, err);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

async fn settle(store: &dyn VideoStore, cdn: &dyn MediaCdn, intent: &UploadIntent) -> AppResult<IntentStatus> {
    if store.video_exists(&intent.video_id).await? {
        store.set_intent_status(&intent.video_id, IntentStatus::Completed).await?;
        return Ok(IntentStatus::Completed);
    }

    if !cdn.delete_video(&intent.video_id).await? {
        tracing::info!("Video {} was already gone from the CDN", intent.video_id);
    }
    store.set_intent_status(&intent.video_id, IntentStatus::Abandoned).await?;
    tracing::info!("Abandoned upload of video {} by user {}", intent.video_id, intent.user_id);
    Ok(IntentStatus::Abandoned)
}

pub async fn reconcile_loop(store: Arc<dyn VideoStore>, cdn: Arc<dyn MediaCdn>, interval: Duration, grace: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        match reconcile_once(store.as_ref(), cdn.as_ref(), grace).await {
            Ok(report) if report == ReconcileReport::default() => {}
            Ok(report) => tracing::info!("Reconciled upload intents: {:?}", report),
            Err(err) => tracing::error!("Upload reconciliation failed: {}", err),
        }
    }
}
