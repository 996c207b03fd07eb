// Article records: the per-article JSON files the analysis stage consumes.
//
// Records are written by the fetch stage (one file per article) and read
// exactly once by a worker. Reading is fallible in a typed way so the
// processor can turn every failure into a skip instead of a crash.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One news article, as stored on disk.
///
/// `url` is the unique key. `publish_date` is ISO-8601 but may be empty when
/// the directory didn't know it; `text` is empty when retrieval failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    #[serde(default)]
    pub media_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub publish_date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
}

impl ArticleRecord {
    /// Whether this record carries any text worth scoring.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Why an article file couldn't be turned into an `ArticleRecord`.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed article JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("article {path} has no url")]
    MissingUrl { path: PathBuf },
}

/// Read and validate one article file.
///
/// Non-UTF-8 content surfaces as `ReadError::Io` (from `read_to_string`).
pub fn read_article(path: &Path) -> Result<ArticleRecord, ReadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let article: ArticleRecord = serde_json::from_str(&raw).map_err(|source| ReadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if article.url.trim().is_empty() {
        return Err(ReadError::MissingUrl {
            path: path.to_path_buf(),
        });
    }

    Ok(article)
}

/// List the `*.json` article files in a directory, sorted by path so runs
/// over the same directory dispatch in the same order.
pub fn list_article_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Story directories emit `null` for unknown dates; treat it like a missing field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_read_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "0.json",
            r#"{"url":"http://a","title":"T","text":"good news","tags":["x"],"media_name":"X","publish_date":"2024-01-01"}"#,
        );
        let article = read_article(&path).unwrap();
        assert_eq!(article.url, "http://a");
        assert_eq!(article.tags, vec!["x".to_string()]);
        assert!(article.has_text());
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "0.json", r#"{"url":"http://a","publish_date":null}"#);
        let article = read_article(&path).unwrap();
        assert_eq!(article.publish_date, "");
        assert!(article.tags.is_empty());
        assert!(!article.has_text());
    }

    #[test]
    fn test_whitespace_only_text_has_no_text() {
        let article = ArticleRecord {
            url: "http://a".into(),
            media_name: String::new(),
            publish_date: String::new(),
            title: String::new(),
            tags: vec![],
            text: " \n\t ".into(),
        };
        assert!(!article.has_text());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.json", "{not json");
        assert!(matches!(read_article(&path), Err(ReadError::Json { .. })));
    }

    #[test]
    fn test_empty_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "0.json", r#"{"url":"  ","text":"hello"}"#);
        assert!(matches!(read_article(&path), Err(ReadError::MissingUrl { .. })));
    }

    #[test]
    fn test_invalid_utf8_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(read_article(&path), Err(ReadError::Io { .. })));
    }

    #[test]
    fn test_list_only_json_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", "{}");
        write(dir.path(), "a.json", "{}");
        write(dir.path(), "notes.txt", "");
        let files = list_article_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }
}
