// MediaCloud directory and search client.
//
// Two paginated listings:
// - sources in a collection (`sources/sources/`), paged by limit/offset
//   until the response's `next` link is null;
// - story metadata matching a query (`search/story-list`), paged by an
//   opaque `pagination_token` until the server stops returning one.
//
// Story pages are saved as-is (one JSON array file per page) and picked up
// later by the fetch stage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rate_limiter::RateLimiter;

/// Sources requested per page of the directory listing.
pub const SOURCES_PER_PAGE: usize = 100;

/// Search platform for online news stories.
const NEWS_PLATFORM: &str = "onlinenews-mediacloud";

/// One news source (outlet) in the MediaCloud directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourcesPage {
    results: Vec<Source>,
    next: Option<String>,
}

/// Metadata for one story, as returned by the search API.
///
/// The fetch stage turns this into an `ArticleRecord` by adding text and
/// tags; unknown fields are kept so nothing the API returned is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryMetadata {
    pub url: String,
    #[serde(default)]
    pub media_name: String,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StoryPage {
    #[serde(default)]
    stories: Vec<StoryMetadata>,
    pagination_token: Option<String>,
}

/// A story search: full-text query over a date range, limited to a set of
/// sources.
#[derive(Debug, Clone)]
pub struct StoryQuery {
    pub query: String,
    /// First day of the range, inclusive
    pub start: NaiveDate,
    /// Last day of the range, inclusive
    pub end: NaiveDate,
    pub source_ids: Vec<u64>,
}

impl StoryQuery {
    fn params(&self, pagination_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", self.query.clone()),
            ("start", self.start.format("%Y-%m-%d").to_string()),
            ("end", self.end.format("%Y-%m-%d").to_string()),
            ("platform", NEWS_PLATFORM.to_string()),
        ];
        if !self.source_ids.is_empty() {
            let ids: Vec<String> = self.source_ids.iter().map(u64::to_string).collect();
            params.push(("ss", ids.join(",")));
        }
        if let Some(token) = pagination_token {
            params.push(("pagination_token", token.to_string()));
        }
        params
    }
}

/// Client for the MediaCloud directory and search APIs.
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl DirectoryClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: &str, api_key: &str, limiter: RateLimiter) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("slant/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            limiter,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        self.limiter.acquire().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Accept", "application/json")
            .query(params)
            .send()
            .await
            .with_context(|| format!("MediaCloud request to {endpoint} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("MediaCloud API returned {} for {}: {}", status, endpoint, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse MediaCloud response from {endpoint}"))
    }

    /// List every source in a collection.
    pub async fn list_sources(&self, collection: u64) -> Result<Vec<Source>> {
        let mut sources = Vec::new();
        let mut offset = 0;

        loop {
            let page: SourcesPage = self
                .get(
                    "sources/sources/",
                    &[
                        ("collection_id", collection.to_string()),
                        ("limit", SOURCES_PER_PAGE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;

            let fetched = page.results.len();
            debug!(collection, offset, fetched, "Fetched sources page");
            sources.extend(page.results);

            match next_offset(offset, fetched, page.next.as_deref()) {
                Some(next) => offset = next,
                None => break,
            }
        }

        info!(collection, sources = sources.len(), "Listed collection sources");
        Ok(sources)
    }

    /// Fetch one page of stories. Returns the stories and the token for the
    /// next page, if there is one.
    pub async fn story_page(
        &self,
        query: &StoryQuery,
        pagination_token: Option<&str>,
    ) -> Result<(Vec<StoryMetadata>, Option<String>)> {
        let page: StoryPage = self
            .get("search/story-list", &query.params(pagination_token))
            .await?;
        let next = page.pagination_token.filter(|t| !t.is_empty());
        Ok((page.stories, next))
    }

    /// List every story matching `query`.
    pub async fn list_stories(&self, query: &StoryQuery) -> Result<Vec<StoryMetadata>> {
        let mut stories = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let (page, next) = self.story_page(query, token.as_deref()).await?;
            debug!(fetched = page.len(), total = stories.len() + page.len(), "Fetched story page");
            stories.extend(page);

            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        info!(query = %query.query, stories = stories.len(), "Listed stories");
        Ok(stories)
    }

    /// Find every story matching `query` in the sources of `collection` and
    /// save them as batch files in `out_dir`, one file per group of sources.
    ///
    /// Returns `(batch files written, stories saved)`.
    pub async fn download_stories(
        &self,
        collection: u64,
        query: &str,
        start: NaiveDate,
        end: NaiveDate,
        out_dir: &Path,
    ) -> Result<(usize, usize)> {
        let sources = self.list_sources(collection).await?;
        if sources.is_empty() {
            anyhow::bail!("Collection {collection} has no sources");
        }

        let ids: Vec<u64> = sources.iter().map(|s| s.id).collect();
        let mut batches = 0;
        let mut total = 0;

        for group in ids.chunks(SOURCES_PER_QUERY) {
            let story_query = StoryQuery {
                query: query.to_string(),
                start,
                end,
                source_ids: group.to_vec(),
            };
            let stories = self.list_stories(&story_query).await?;
            if stories.is_empty() {
                continue;
            }
            save_stories(out_dir, batches, &stories)?;
            batches += 1;
            total += stories.len();
        }

        info!(collection, batches, stories = total, "Saved story batches");
        Ok((batches, total))
    }
}

/// Source ids per story search, keeping request URLs a sane length.
const SOURCES_PER_QUERY: usize = 50;

/// Offset for the next sources page, or `None` when the listing is done.
///
/// An empty page ends the listing even if the server still sends a `next`
/// link, so a misbehaving server can't loop us forever.
fn next_offset(offset: usize, fetched: usize, next: Option<&str>) -> Option<usize> {
    match next {
        Some(_) if fetched > 0 => Some(offset + fetched),
        _ => None,
    }
}

/// Write one batch of stories as a JSON array file `stories_<batch>.json`
/// in `dir`, creating the directory if needed.
pub fn save_stories(dir: &Path, batch: usize, stories: &[StoryMetadata]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create story directory {}", dir.display()))?;

    let path = dir.join(format!("stories_{batch:05}.json"));
    let json = serde_json::to_string_pretty(stories).context("Failed to serialize stories")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    debug!(path = %path.display(), stories = stories.len(), "Saved story batch");
    Ok(path)
}

/// Read a story batch file written by `save_stories`.
pub fn load_stories(path: &Path) -> Result<Vec<StoryMetadata>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Malformed story batch {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_page_deserialize() {
        let json = r#"{
            "count": 2,
            "next": "https://search.mediacloud.org/api/sources/sources/?offset=100",
            "previous": null,
            "results": [
                {"id": 1, "name": "nytimes.com", "label": "New York Times", "homepage": "https://nytimes.com"},
                {"id": 2, "name": "foxnews.com"}
            ]
        }"#;
        let page: SourcesPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].label.as_deref(), Some("New York Times"));
        assert_eq!(page.results[1].homepage, None);
        assert!(page.next.is_some());
    }

    #[test]
    fn test_story_page_deserialize_keeps_extra_fields() {
        let json = r#"{
            "stories": [{
                "id": "abc123",
                "media_name": "bbc.co.uk",
                "media_url": "https://bbc.co.uk",
                "publish_date": null,
                "title": "A headline",
                "url": "https://bbc.co.uk/news/1",
                "language": "en"
            }],
            "pagination_token": null
        }"#;
        let page: StoryPage = serde_json::from_str(json).unwrap();
        assert!(page.pagination_token.is_none());
        let story = &page.stories[0];
        assert_eq!(story.url, "https://bbc.co.uk/news/1");
        assert_eq!(story.publish_date, None);
        assert_eq!(story.extra["language"], "en");
    }

    #[test]
    fn test_next_offset() {
        assert_eq!(next_offset(0, 100, Some("next")), Some(100));
        assert_eq!(next_offset(100, 37, Some("next")), Some(137));
        assert_eq!(next_offset(100, 37, None), None);
        assert_eq!(next_offset(200, 0, Some("next")), None);
    }

    #[test]
    fn test_query_params() {
        let query = StoryQuery {
            query: "election".into(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            source_ids: vec![1, 22],
        };
        let params = query.params(Some("tok"));
        assert!(params.contains(&("ss", "1,22".to_string())));
        assert!(params.contains(&("pagination_token", "tok".to_string())));
        assert!(params.contains(&("platform", NEWS_PLATFORM.to_string())));
        assert!(params.contains(&("end", "2024-01-31".to_string())));

        let first = query.params(None);
        assert!(!first.iter().any(|(k, _)| *k == "pagination_token"));
    }

    #[test]
    fn test_save_and_load_stories() {
        let dir = tempfile::tempdir().unwrap();
        let stories = vec![StoryMetadata {
            url: "https://example.com/a".into(),
            media_name: "example.com".into(),
            publish_date: Some("2024-03-01".into()),
            title: "A".into(),
            extra: serde_json::Map::new(),
        }];
        let path = save_stories(&dir.path().join("data"), 3, &stories).unwrap();
        assert!(path.ends_with("stories_00003.json"));
        assert_eq!(load_stories(&path).unwrap(), stories);
    }
}
