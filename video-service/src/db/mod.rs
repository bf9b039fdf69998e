mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, exists};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::QueryFragment;
use diesel::query_dsl::LoadQuery;
use serde::Serialize;

use schema::*;

use crate::error::{AppError, AppResult};
use crate::feed::{FeedQuery, SortOrder};
use crate::model::Visibility;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = videos)]
pub struct Video {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub visibility: String,
    pub user_id: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration: Option<i32>,
    pub views: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = videos)]
pub struct NewVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub visibility: String,
    pub user_id: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// only the public profile columns of the user table
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = user)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

pub type FeedRow = (Video, Option<Author>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Pending,
    Completed,
    Abandoned,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Completed => "completed",
            IntentStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = upload_intents)]
pub struct UploadIntent {
    pub video_id: String,
    pub user_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = upload_intents)]
struct NewUploadIntent<'a> {
    video_id: &'a str,
    user_id: &'a str,
    status: &'static str,
}

/// Video metadata store. Implemented on PostgreSQL for the service, in memory for tests.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Writes (or re-opens) the pending intent for a finalize attempt. Fails with a validation error
    /// when the video was already saved, so a repeated finalize never reaches the CDN.
    async fn record_intent(&self, video_id: &str, user_id: &str) -> AppResult<()>;

    /// Inserts the video row and completes its intent atomically.
    async fn complete_upload(&self, video: NewVideo) -> AppResult<()>;

    /// One page of the feed, plus the number of rows matching the predicate across all pages.
    async fn list_feed(&self, query: FeedQuery) -> AppResult<(Vec<FeedRow>, i64)>;

    async fn stale_intents(&self, older_than: DateTime<Utc>) -> AppResult<Vec<UploadIntent>>;

    async fn video_exists(&self, video_id: &str) -> AppResult<bool>;

    async fn set_intent_status(&self, video_id: &str, status: IntentStatus) -> AppResult<()>;
}

pub(crate) fn already_saved(video_id: &str) -> AppError {
    AppError::validation(format!("Video {video_id} is already saved"))
}

pub struct PgVideoStore {
    database_url: String,
}

impl PgVideoStore {
    pub fn new(database_url: &str) -> Self {
        PgVideoStore { database_url: database_url.to_string() }
    }

    /// Runs blocking diesel work on a fresh connection off the async runtime.
    async fn run<T, F>(&self, work: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    {
        let database_url = self.database_url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&database_url)?;
            work(&mut conn)
        })
        .await
        .map_err(|err| AppError::Internal(format!("database task failed: {err}")))?
    }
}

// applies the visibility and search predicates to a boxed videos query, whatever it selects
macro_rules! filter_feed {
    ($source:expr, $query:expr) => {{
        let query: &FeedQuery = $query;
        let public = Visibility::Public.as_str();
        let source = $source;
        let mut source = match query.viewer.as_deref() {
            Some(viewer) => source.filter(videos::visibility.eq(public).or(videos::user_id.eq(viewer))),
            None => source.filter(videos::visibility.eq(public)),
        };
        if let Some(pattern) = query.title_pattern.as_deref() {
            source = source.filter(videos::title.ilike(pattern));
        }
        source
    }};
}

fn feed_count_query(query: &FeedQuery) -> videos::BoxedQuery<'_, Pg, diesel::sql_types::BigInt> {
    filter_feed!(videos::table.select(count_star()).into_boxed(), query)
}

fn feed_rows_query<'a>(
    query: &'a FeedQuery,
) -> impl RunQueryDsl<PgConnection> + LoadQuery<'a, PgConnection, FeedRow> + QueryFragment<Pg> + 'a {
    let rows = filter_feed!(
        videos::table
            .left_join(user::table)
            .select((Video::as_select(), Option::<Author>::as_select()))
            .into_boxed(),
        query
    );

    let rows = match query.sort {
        SortOrder::MostRecent => rows.order(videos::created_at.desc()),
        SortOrder::OldestFirst => rows.order(videos::created_at.asc()),
        SortOrder::MostViewed => rows.order(videos::views.desc()),
        SortOrder::LeastViewed => rows.order(videos::views.asc()),
    };

    rows.then_order_by(videos::video_id.asc())
        .limit(query.limit())
        .offset(query.offset())
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn record_intent(&self, video_id: &str, user_id: &str) -> AppResult<()> {
        let (video_id, user_id) = (video_id.to_string(), user_id.to_string());
        self.run(move |conn| {
            conn.transaction::<_, AppError, _>(|conn| {
                let status = upload_intents::table
                    .find(video_id.as_str())
                    .select(upload_intents::status)
                    .for_update()
                    .first::<String>(conn)
                    .optional()?;
                if status.as_deref() == Some(IntentStatus::Completed.as_str()) {
                    return Err(already_saved(&video_id));
                }

                let pending = IntentStatus::Pending.as_str();
                diesel::insert_into(upload_intents::table)
                    .values(&NewUploadIntent { video_id: &video_id, user_id: &user_id, status: pending })
                    .on_conflict(upload_intents::video_id)
                    .do_update()
                    .set((
                        upload_intents::user_id.eq(&user_id),
                        upload_intents::status.eq(pending),
                        upload_intents::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn complete_upload(&self, video: NewVideo) -> AppResult<()> {
        self.run(move |conn| {
            conn.transaction::<_, AppError, _>(|conn| {
                diesel::insert_into(videos::table)
                    .values(&video)
                    .execute(conn)?;

                diesel::update(upload_intents::table.find(video.video_id.as_str()))
                    .set((
                        upload_intents::status.eq(IntentStatus::Completed.as_str()),
                        upload_intents::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn list_feed(&self, query: FeedQuery) -> AppResult<(Vec<FeedRow>, i64)> {
        self.run(move |conn| {
            let total = feed_count_query(&query).get_result::<i64>(conn)?;
            let rows = feed_rows_query(&query).load::<FeedRow>(conn)?;
            Ok((rows, total))
        })
        .await
    }

    async fn stale_intents(&self, older_than: DateTime<Utc>) -> AppResult<Vec<UploadIntent>> {
        self.run(move |conn| {
            let intents = upload_intents::table
                .filter(upload_intents::status.eq(IntentStatus::Pending.as_str()))
                .filter(upload_intents::updated_at.lt(older_than))
                .order(upload_intents::created_at.asc())
                .select(UploadIntent::as_select())
                .load(conn)?;
            Ok(intents)
        })
        .await
    }

    async fn video_exists(&self, video_id: &str) -> AppResult<bool> {
        let video_id = video_id.to_string();
        self.run(move |conn| {
            let found = diesel::select(exists(videos::table.find(video_id.as_str())))
                .get_result::<bool>(conn)?;
            Ok(found)
        })
        .await
    }

    async fn set_intent_status(&self, video_id: &str, status: IntentStatus) -> AppResult<()> {
        let video_id = video_id.to_string();
        self.run(move |conn| {
            diesel::update(upload_intents::table.find(video_id.as_str()))
                .set((
                    upload_intents::status.eq(status.as_str()),
                    upload_intents::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
