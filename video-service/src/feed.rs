use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::db::{Author, Video, VideoStore};
use crate::error::AppResult;

pub const DEFAULT_PAGE_SIZE: i64 = 8;
pub const MAX_PAGE_SIZE: i64 = 50;
// keeps the offset of the last page representable
pub const MAX_PAGE_NUMBER: i64 = i64::MAX / MAX_PAGE_SIZE;

// rendered pages kept before the cache is cleared wholesale
const FEED_CACHE_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    MostRecent,
    OldestFirst,
    MostViewed,
    LeastViewed,
}

impl SortOrder {
    /// Accepts the labels shown in the UI ("Most Viewed") as well as slugs ("most-viewed").
    /// Anything else, including no key at all, sorts newest first.
    pub fn from_key(key: Option<&str>) -> Self {
        let Some(key) = key else {
            return SortOrder::MostRecent;
        };

        let normalized: String = key
            .trim()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c.to_ascii_lowercase() })
            .collect();

        match normalized.as_str() {
            "most recent" => SortOrder::MostRecent,
            "oldest first" => SortOrder::OldestFirst,
            "most viewed" => SortOrder::MostViewed,
            "least viewed" => SortOrder::LeastViewed,
            _ => SortOrder::MostRecent,
        }
    }
}

/// Query string of the feed route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    pub query: Option<String>,
    pub filter: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Fully resolved feed query, ready to be run by a [`VideoStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedQuery {
    pub viewer: Option<String>,
    pub title_pattern: Option<String>,
    pub sort: SortOrder,
    pub page_number: i64,
    pub page_size: i64,
}

impl FeedQuery {
    pub fn compose(viewer: Option<&str>, params: &FeedParams) -> Self {
        let title_pattern = params
            .query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(|query| format!("%{}%", escape_like(query)));

        FeedQuery {
            viewer: viewer.map(str::to_string),
            title_pattern,
            sort: SortOrder::from_key(params.filter.as_deref()),
            page_number: params.page.unwrap_or(1).clamp(1, MAX_PAGE_NUMBER),
            page_size: params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page_number - 1).saturating_mul(self.page_size)
    }
}

/// Escapes the LIKE wildcards so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page_number: i64,
    pub page_size: i64,
    pub total_videos: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page_number: i64, page_size: i64, total_videos: i64) -> Self {
        let total_videos = total_videos.max(0);
        Pagination {
            page_number,
            page_size,
            total_videos,
            total_pages: (total_videos + page_size - 1) / page_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub video: Video,
    pub user: Option<Author>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub videos: Vec<FeedItem>,
    pub pagination: Pagination,
}

pub async fn list_videos(store: &dyn VideoStore, query: FeedQuery) -> AppResult<FeedPage> {
    let (page_number, page_size) = (query.page_number, query.page_size);
    let (rows, total_videos) = store.list_feed(query).await?;

    let videos = rows
        .into_iter()
        .map(|(video, user)| FeedItem { video, user })
        .collect();

    Ok(FeedPage {
        videos,
        pagination: Pagination::new(page_number, page_size, total_videos),
    })
}

struct CachedPages {
    generation: u64,
    pages: HashMap<FeedQuery, FeedPage>,
}

/// Rendered feed pages. Every new video invalidates all of them, the same way the web app
/// revalidates the home route.
///
/// A page may only be stored under the generation that was current before its rows were read;
/// otherwise a read racing an invalidation would cache a feed missing the new video.
pub struct FeedCache {
    state: Mutex<CachedPages>,
}

impl FeedCache {
    pub fn new() -> Self {
        FeedCache {
            state: Mutex::new(CachedPages { generation: 0, pages: HashMap::new() }),
        }
    }

    pub fn get(&self, query: &FeedQuery) -> Option<FeedPage> {
        self.state.lock().pages.get(query).cloned()
    }

    /// Current generation; read it before loading the page that will be inserted.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Stores `page` unless the cache was invalidated after `generation` was read.
    pub fn insert(&self, query: FeedQuery, page: FeedPage, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!("Dropping feed page read before the last invalidation");
            return;
        }
        if state.pages.len() >= FEED_CACHE_CAPACITY {
            state.pages.clear();
        }
        state.pages.insert(query, page);
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        tracing::debug!("Invalidating {} cached feed pages", state.pages.len());
        state.generation += 1;
        state.pages.clear();
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new()
    }
}
