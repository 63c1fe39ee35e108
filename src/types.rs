//! Core types for the docsieve pipeline

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Unique identifier for a stored article chunk
pub type RecordId = String;

// ============================================================================
// Candidate URLs
// ============================================================================

/// A parsed candidate URL with its derived attributes.
///
/// Instances are only handed to the fetcher after URL governance accepted them
/// (see [`crate::scraping::UrlGovernor::candidate`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateUrl {
    raw: String,
    parsed: Url,
    is_pdf: bool,
}

impl CandidateUrl {
    /// Parse a raw URL string. Returns `None` if it is not an absolute URL.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let parsed = Url::parse(raw).ok()?;
        Some(Self {
            raw: raw.to_string(),
            is_pdf: looks_like_pdf(raw),
            parsed,
        })
    }

    /// The URL exactly as supplied by the caller
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed URL
    pub fn url(&self) -> &Url {
        &self.parsed
    }

    pub fn scheme(&self) -> &str {
        self.parsed.scheme()
    }

    pub fn host(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.parsed.path()
    }

    /// Whether the URL should go through the PDF extraction path
    pub fn is_pdf(&self) -> bool {
        self.is_pdf
    }

    /// Key used for deduplication and as the stored `url` field
    pub fn dedup_key(&self) -> String {
        crate::scraping::normalize_url(&self.raw)
    }
}

impl fmt::Display for CandidateUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Detect PDF links by a `/pdf/` path segment or a `.pdf` suffix
pub fn looks_like_pdf(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.contains("/pdf/") || path.ends_with(".pdf")
}

// ============================================================================
// Fetch results
// ============================================================================

/// Raw content retrieved for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// The URL that was fetched
    pub url: String,
    /// Cleaned text, if anything usable was extracted
    pub raw_content: Option<String>,
    /// True iff `raw_content` holds non-empty text
    pub succeeded: bool,
    /// Whether the proxied attempt produced this result
    pub used_proxy: bool,
}

impl FetchResult {
    /// A fetch that produced content
    pub fn with_content(url: impl Into<String>, content: String, used_proxy: bool) -> Self {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Self::empty(url, used_proxy);
        }
        Self {
            url: url.into(),
            raw_content: Some(trimmed.to_string()),
            succeeded: true,
            used_proxy,
        }
    }

    /// A fetch that produced nothing usable (failure or filtered)
    pub fn empty(url: impl Into<String>, used_proxy: bool) -> Self {
        Self {
            url: url.into(),
            raw_content: None,
            succeeded: false,
            used_proxy,
        }
    }

    /// Take the content out, consuming the result
    pub fn into_content(self) -> Option<String> {
        self.raw_content
    }
}

// ============================================================================
// Quality verdicts
// ============================================================================

/// Structured decision produced by the quality gate for one article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub high_quality: bool,
    pub needs_compression: bool,
    pub compressed_text: Option<String>,
    pub title: Option<String>,
    pub scenario: Option<String>,
    pub reason: Option<String>,
}

impl QualityVerdict {
    /// A rejection carrying a diagnostic reason
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// The text that should be persisted for this verdict.
    ///
    /// Compressed text supersedes the original when compression was requested
    /// and the service actually returned something.
    pub fn content_to_persist<'a>(&'a self, original: &'a str) -> &'a str {
        match (&self.compressed_text, self.needs_compression) {
            (Some(compressed), true) if !compressed.trim().is_empty() => compressed,
            _ => original,
        }
    }
}

// ============================================================================
// Stored records
// ============================================================================

/// One embedded chunk of an accepted article, as written to the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: RecordId,
    pub url: String,
    pub title: String,
    #[serde(rename = "content")]
    pub content_chunk: String,
    #[serde(rename = "content_emb")]
    pub embedding_vector: Embedding,
    /// Creation time in epoch milliseconds (UTC)
    #[serde(rename = "create_time")]
    pub created_at: i64,
}

impl ArticleRecord {
    /// Create a record with a fresh id and the current timestamp
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content_chunk: impl Into<String>,
        embedding_vector: Embedding,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            content_chunk: content_chunk.into(),
            embedding_vector,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Serialize into a store row
    pub fn to_row(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An accepted article waiting to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedArticle {
    /// Dedup key (normalized URL)
    pub url: String,
    pub title: String,
    pub content: String,
}

// ============================================================================
// Per-task state
// ============================================================================

/// State threaded through fetch, normalize, evaluate and persist for one URL
#[derive(Debug, Clone)]
pub struct PipelineItem {
    pub candidate: CandidateUrl,
    pub query: String,
    pub content: Option<String>,
    pub verdict: Option<QualityVerdict>,
}

impl PipelineItem {
    pub fn new(candidate: CandidateUrl, query: impl Into<String>) -> Self {
        Self {
            candidate,
            query: query.into(),
            content: None,
            verdict: None,
        }
    }

    /// Build the article to persist once the verdict accepted the content
    pub fn accepted_article(&self) -> Option<AcceptedArticle> {
        let verdict = self.verdict.as_ref().filter(|v| v.high_quality)?;
        let original = self.content.as_deref()?;
        let content = verdict.content_to_persist(original).to_string();
        Some(AcceptedArticle {
            url: self.candidate.dedup_key(),
            title: verdict.title.clone().unwrap_or_default(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_attributes() {
        let c = CandidateUrl::parse("https://Example.com/pdf/report?x=1").unwrap();
        assert_eq!(c.scheme(), "https");
        assert_eq!(c.host(), "example.com");
        assert_eq!(c.path(), "/pdf/report");
        assert!(c.is_pdf());
    }

    #[test]
    fn test_dedup_key_ignores_scheme_host_case_and_default_port() {
        let key = CandidateUrl::parse("https://blog.example.com/post").unwrap().dedup_key();
        let upper = CandidateUrl::parse("HTTPS://BLOG.EXAMPLE.COM/post").unwrap();
        let with_port = CandidateUrl::parse("https://blog.example.com:443/post/").unwrap();
        assert_eq!(upper.dedup_key(), key);
        assert_eq!(with_port.dedup_key(), key);
        // the raw form is still what gets fetched
        assert_eq!(upper.as_str(), "HTTPS://BLOG.EXAMPLE.COM/post");
    }

    #[test]
    fn test_candidate_rejects_relative() {
        assert!(CandidateUrl::parse("/relative/path").is_none());
        assert!(CandidateUrl::parse("").is_none());
    }

    #[test]
    fn test_looks_like_pdf() {
        assert!(looks_like_pdf("https://arxiv.org/pdf/2407.21075"));
        assert!(looks_like_pdf("https://example.com/paper.PDF"));
        assert!(looks_like_pdf("https://example.com/paper.pdf?download=1"));
        assert!(!looks_like_pdf("https://example.com/article/123"));
        assert!(!looks_like_pdf("https://example.com/pdfs-explained"));
    }

    #[test]
    fn test_fetch_result_blank_content_is_empty() {
        let r = FetchResult::with_content("https://a.com", "   \n".to_string(), true);
        assert!(!r.succeeded);
        assert!(r.raw_content.is_none());
        assert!(r.used_proxy);
    }

    #[test]
    fn test_verdict_compressed_text_supersedes() {
        let verdict = QualityVerdict {
            high_quality: true,
            needs_compression: true,
            compressed_text: Some("short".to_string()),
            ..QualityVerdict::default()
        };
        assert_eq!(verdict.content_to_persist("long original"), "short");

        let not_compressed = QualityVerdict {
            needs_compression: false,
            ..verdict.clone()
        };
        assert_eq!(not_compressed.content_to_persist("long original"), "long original");

        let empty_compressed = QualityVerdict {
            compressed_text: Some("  ".to_string()),
            ..verdict
        };
        assert_eq!(empty_compressed.content_to_persist("long original"), "long original");
    }

    #[test]
    fn test_record_row_field_names() {
        let record = ArticleRecord::new("https://a.com/x", "T", "body", vec![0.1, 0.2]);
        let row = record.to_row();
        assert_eq!(row["url"], "https://a.com/x");
        assert_eq!(row["content"], "body");
        assert!(row["content_emb"].is_array());
        assert!(row["create_time"].as_i64().unwrap() > 0);
        assert_eq!(row["id"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_pipeline_item_accepted_article_uses_dedup_key() {
        let candidate = CandidateUrl::parse("https://x.com/a/?q=1#frag").unwrap();
        let mut item = PipelineItem::new(candidate, "query");
        item.content = Some("text".to_string());
        assert!(item.accepted_article().is_none());

        item.verdict = Some(QualityVerdict {
            high_quality: true,
            title: Some("Title".to_string()),
            ..QualityVerdict::default()
        });
        let article = item.accepted_article().unwrap();
        assert_eq!(article.url, "https://x.com/a");
        assert_eq!(article.title, "Title");
        assert_eq!(article.content, "text");
    }
}
