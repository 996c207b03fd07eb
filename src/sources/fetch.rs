// Article text retrieval.
//
// Turns saved story batches into per-article JSON files: each story's URL is
// fetched, the body text and keyword tags are pulled out of the HTML, and the
// result is written as one numbered ArticleRecord file. A story whose page
// can't be fetched still gets a file, with empty text, so the analysis stage
// sees it and skips it explicitly.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use regex_lite::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::directory::{load_stories, StoryMetadata};
use crate::article::ArticleRecord;

/// Text and tags extracted from one article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedArticle {
    pub text: String,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("not a fetchable URL: {url}")]
    InvalidUrl { url: String },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not extract article from {url}: {reason}")]
    Extract { url: String, reason: String },
}

/// Retrieves article text for a URL.
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedArticle, FetchError>;
}

/// Fetches pages over HTTP and extracts paragraphs and keyword tags.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("Mozilla/5.0 (compatible; slant/", env!("CARGO_PKG_VERSION"), ")"))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedArticle, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let response = self.client.get(parsed).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(request_error)?;
        extract_article(&body).map_err(|reason| FetchError::Extract {
            url: url.to_string(),
            reason,
        })
    }
}

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("bad selector {css:?}: {e:?}"))
}

/// Pull body text and keyword tags out of an HTML document.
///
/// Text is the document's `<p>` elements, whitespace-collapsed, one paragraph
/// per line. Tags come from `keywords` / `news_keywords` meta tags
/// (comma-separated) and `article:tag` properties. A page with no paragraph
/// text is an error.
pub fn extract_article(html: &str) -> Result<FetchedArticle, String> {
    let document = Html::parse_document(html);

    let paragraph = selector("p")?;
    let text = document
        .select(&paragraph)
        .map(|p| {
            let raw: String = p.text().collect();
            WHITESPACE.replace_all(raw.trim(), " ").into_owned()
        })
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return Err("no paragraph text on page".to_string());
    }

    let mut tags = BTreeSet::new();
    let keywords = selector(r#"meta[name="keywords"], meta[name="news_keywords"]"#)?;
    for meta in document.select(&keywords) {
        if let Some(content) = meta.value().attr("content") {
            tags.extend(
                content
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        }
    }
    let article_tags = selector(r#"meta[property="article:tag"]"#)?;
    for meta in document.select(&article_tags) {
        if let Some(tag) = meta.value().attr("content").map(str::trim) {
            if !tag.is_empty() {
                tags.insert(tag.to_string());
            }
        }
    }

    Ok(FetchedArticle { text, tags })
}

/// Fetch an article, degrading any failure to empty text and no tags.
pub async fn fetch_text_or_empty(fetcher: &dyn ArticleFetcher, url: &str) -> FetchedArticle {
    match fetcher.fetch(url).await {
        Ok(article) => article,
        Err(e) => {
            warn!(url, error = %e, "Failed to download article");
            FetchedArticle::default()
        }
    }
}

/// Counts from one `expand_story_batches` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandSummary {
    pub articles: usize,
    pub with_text: usize,
}

/// Read every story batch in `input_dir`, fetch each story's text, and write
/// one numbered ArticleRecord file per story into `output_dir`.
///
/// Files are numbered `0.json`, `1.json`, ... in batch-file then story order,
/// regardless of which fetch finishes first.
pub async fn expand_story_batches(
    input_dir: &Path,
    output_dir: &Path,
    fetcher: &dyn ArticleFetcher,
    concurrency: usize,
) -> Result<ExpandSummary> {
    let batches = crate::article::list_article_files(input_dir)
        .with_context(|| format!("Failed to list story batches in {}", input_dir.display()))?;

    let mut stories = Vec::new();
    for batch in &batches {
        let loaded = load_stories(batch)?;
        debug!(path = %batch.display(), stories = loaded.len(), "Loaded story batch");
        stories.extend(loaded);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    info!(
        batches = batches.len(),
        stories = stories.len(),
        concurrency,
        "Fetching article text"
    );

    let pb = ProgressBar::new(stories.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Fetching [{bar:30}] {pos}/{len} ({eta})")
            .expect("valid template"),
    );

    let results: Vec<Result<bool>> = stream::iter(stories.into_iter().enumerate())
        .map(|(n, story)| {
            let pb = &pb;
            async move {
                let fetched = fetch_text_or_empty(fetcher, &story.url).await;
                let has_text = !fetched.text.trim().is_empty();
                let path = output_dir.join(format!("{n}.json"));
                write_article(&path, story, fetched)?;
                pb.inc(1);
                Ok::<_, anyhow::Error>(has_text)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    pb.finish_and_clear();

    let mut summary = ExpandSummary::default();
    for result in results {
        if result? {
            summary.with_text += 1;
        }
        summary.articles += 1;
    }

    info!(
        articles = summary.articles,
        with_text = summary.with_text,
        "Wrote article files"
    );
    Ok(summary)
}

fn write_article(path: &Path, story: StoryMetadata, fetched: FetchedArticle) -> Result<()> {
    let record = ArticleRecord {
        url: story.url,
        media_name: story.media_name,
        publish_date: story.publish_date.unwrap_or_default(),
        title: story.title,
        tags: fetched.tags.into_iter().collect(),
        text: fetched.text,
    };
    let json = serde_json::to_string_pretty(&record).context("Failed to serialize article")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::directory::save_stories;

    const PAGE: &str = r#"<html><head>
        <meta name="keywords" content="politics, economy ,  ">
        <meta name="news_keywords" content="economy,budget">
        <meta property="article:tag" content="Congress">
        </head><body>
        <nav><p>   </p></nav>
        <p>First   paragraph
           spans lines.</p>
        <div><p>Second <b>bold</b> paragraph.</p></div>
        </body></html>"#;

    #[test]
    fn test_extract_article_text_and_tags() {
        let article = extract_article(PAGE).unwrap();
        assert_eq!(
            article.text,
            "First paragraph spans lines.\nSecond bold paragraph."
        );
        let tags: Vec<&str> = article.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["Congress", "budget", "economy", "politics"]);
    }

    #[test]
    fn test_extract_article_without_paragraphs() {
        for html in [
            "<html><body><div>nothing</div></body></html>",
            r#"<html><head><meta name="keywords" content="a,b"></head><body><p> </p></body></html>"#,
        ] {
            let err = extract_article(html).unwrap_err();
            assert!(err.contains("no paragraph text"), "{err}");
        }
    }

    /// Serves canned pages; URLs containing "broken" fail.
    struct FakeFetcher;

    #[async_trait]
    impl ArticleFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedArticle, FetchError> {
            if url.contains("broken") {
                return Err(FetchError::Extract {
                    url: url.to_string(),
                    reason: "no body".into(),
                });
            }
            Ok(FetchedArticle {
                text: format!("text of {url}"),
                tags: BTreeSet::from(["news".to_string()]),
            })
        }
    }

    fn story(url: &str) -> StoryMetadata {
        StoryMetadata {
            url: url.to_string(),
            media_name: "example.com".into(),
            publish_date: None,
            title: format!("title {url}"),
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_non_http_urls() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        for url in ["not a url", "ftp://example.com/file", "file:///etc/passwd"] {
            let err = fetcher.fetch(url).await.unwrap_err();
            assert!(matches!(err, FetchError::InvalidUrl { .. }), "{url}: {err}");
        }
    }

    #[tokio::test]
    async fn test_fetch_text_or_empty_degrades() {
        let article = fetch_text_or_empty(&FakeFetcher, "https://example.com/broken").await;
        assert_eq!(article, FetchedArticle::default());
    }

    #[tokio::test]
    async fn test_expand_story_batches_numbers_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let out = dir.path().join("articles");
        save_stories(&data, 0, &[story("https://example.com/a"), story("https://example.com/broken")])
            .unwrap();
        save_stories(&data, 1, &[story("https://example.com/c")]).unwrap();

        let summary = expand_story_batches(&data, &out, &FakeFetcher, 2).await.unwrap();
        assert_eq!(summary, ExpandSummary { articles: 3, with_text: 2 });

        let read = |n: usize| crate::article::read_article(&out.join(format!("{n}.json"))).unwrap();
        assert_eq!(read(0).url, "https://example.com/a");
        assert_eq!(read(0).tags, vec!["news".to_string()]);
        assert_eq!(read(0).publish_date, "");
        assert_eq!(read(1).url, "https://example.com/broken");
        assert!(!read(1).has_text());
        assert_eq!(read(2).text, "text of https://example.com/c");
    }
}
