//! News headlines feeding the prompt.
//!
//! Each configured source is fetched and scraped independently. Sources run
//! concurrently and a failing source contributes nothing but a warning.

use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{NewsConfig, NewsKind, NewsSource};
use crate::dom::{Document, NodeId};
use crate::{Error, Result};

/// Containers of a generic article listing, most specific first.
const ARTICLE_SELECTORS: [&str; 2] = ["article, .post, .entry, .blog-post", ".news-item, .article, .content-item"];

/// Headings shorter than this are navigation, not headlines.
const MIN_HEADING_CHARS: usize = 10;

/// One scraped headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Headline {
    /// Headline text.
    pub title: String,
    /// Absolute link, when the page has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Site the story links to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Score line, e.g. `"120 points"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
}

/// Headlines of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHeadlines {
    /// Source label from the configuration.
    pub source: String,
    /// Scraped headlines, at most the configured limit.
    pub headlines: Vec<Headline>,
}

/// HTTP client for news pages.
pub struct NewsFetcher {
    client: Client,
}

impl NewsFetcher {
    /// Client with the given per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("livesite/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Client configured from `[news]`.
    pub fn from_config(config: &NewsConfig) -> Result<Self> {
        Self::with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Fetch and scrape one source.
    pub async fn fetch_source(&self, source: &NewsSource) -> Result<Vec<Headline>> {
        let response = self.client.get(&source.url).send().await?;
        let response = response.error_for_status()?;
        let html = response.text().await?;
        debug!(source = %source.name, bytes = html.len(), "fetched news page");

        let base = Url::parse(&source.url).ok();
        let doc = Document::parse(&html)?;
        let headlines = match source.kind {
            NewsKind::HackerNews => scrape_hacker_news(&doc, base.as_ref(), source.limit)?,
            NewsKind::Articles => scrape_articles(&doc, base.as_ref(), source.limit)?,
        };
        Ok(headlines)
    }

    /// Fetch every source concurrently. Failures are logged and yield an
    /// empty list for that source.
    pub async fn fetch_all(&self, sources: &[NewsSource]) -> Vec<SourceHeadlines> {
        let fetches = sources.iter().map(|source| async move {
            let headlines = match self.fetch_source(source).await {
                Ok(headlines) => headlines,
                Err(e) => {
                    warn!(source = %source.name, category = e.category(), "news fetch failed: {e}");
                    Vec::new()
                },
            };
            SourceHeadlines {
                source: source.name.clone(),
                headlines,
            }
        });
        let results = join_all(fetches).await;
        let total: usize = results.iter().map(|r| r.headlines.len()).sum();
        info!(sources = results.len(), headlines = total, "news gathered");
        results
    }
}

/// Fetch headlines for `config`, or nothing when news is disabled or the
/// client cannot be built.
pub async fn gather(config: &NewsConfig) -> Vec<SourceHeadlines> {
    if !config.enabled || config.sources.is_empty() {
        return Vec::new();
    }
    match NewsFetcher::from_config(config) {
        Ok(fetcher) => fetcher.fetch_all(&config.sources).await,
        Err(e) => {
            warn!("news client unavailable: {e}");
            Vec::new()
        },
    }
}

fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn absolute(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map_or_else(|| href.to_string(), |u| u.to_string())
}

fn first_text(doc: &Document, scope: NodeId, selector: &str) -> Result<Option<String>> {
    Ok(doc
        .select_within(scope, selector)?
        .into_iter()
        .map(|node| clean_text(&doc.text_content(node)))
        .find(|text| !text.is_empty()))
}

/// Front-page rows are `tr.athing`; the score sits in the row after.
fn scrape_hacker_news(doc: &Document, base: Option<&Url>, limit: usize) -> Result<Vec<Headline>> {
    let mut headlines = Vec::new();
    for row in doc.select("tr.athing")? {
        if headlines.len() >= limit {
            break;
        }
        let Some(link) = doc.select_within(row, "span.titleline > a")?.first().copied() else {
            continue;
        };
        let title = clean_text(&doc.text_content(link));
        if title.is_empty() {
            continue;
        }
        let score = match next_element_sibling(doc, row) {
            Some(subtext) => first_text(doc, subtext, "span.score")?,
            None => None,
        };
        headlines.push(Headline {
            title,
            url: doc.attr(link, "href").map(|href| absolute(base, href)),
            site: first_text(doc, row, "span.sitestr")?,
            score,
        });
    }
    Ok(headlines)
}

fn next_element_sibling(doc: &Document, node: NodeId) -> Option<NodeId> {
    let parent = doc.parent(node)?;
    let siblings = doc.element_children(parent);
    let position = siblings.iter().position(|s| *s == node)?;
    siblings.get(position + 1).copied()
}

/// Article containers first, then bare headings.
fn scrape_articles(doc: &Document, base: Option<&Url>, limit: usize) -> Result<Vec<Headline>> {
    for selector in ARTICLE_SELECTORS {
        let mut headlines = Vec::new();
        for item in doc.select(selector)? {
            if headlines.len() >= limit {
                break;
            }
            let Some(title) = first_text(doc, item, "h1, h2, h3, h4, .title")? else {
                continue;
            };
            let url = doc
                .select_within(item, "a[href]")?
                .first()
                .and_then(|a| doc.attr(*a, "href"))
                .map(|href| absolute(base, href));
            headlines.push(Headline {
                title,
                url,
                site: None,
                score: None,
            });
        }
        if !headlines.is_empty() {
            return Ok(headlines);
        }
    }

    Ok(doc
        .select("h1, h2, h3")?
        .into_iter()
        .map(|heading| clean_text(&doc.text_content(heading)))
        .filter(|title| title.chars().count() > MIN_HEADING_CHARS)
        .take(limit)
        .map(|title| Headline {
            title,
            url: None,
            site: None,
            score: None,
        })
        .collect())
}
