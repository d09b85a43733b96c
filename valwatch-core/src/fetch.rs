//! HTTP adapters that feed raw pages and threads into the check cycle.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ThreadSettings;
use crate::error::FetchError;
use crate::poller::{retry_backoff, PollConfig};
use crate::thread::ThreadCandidate;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Fetches the news listing page.
#[derive(Debug, Clone)]
pub struct NewsClient {
    client: Client,
    page_url: String,
    config: PollConfig,
}

impl NewsClient {
    pub fn new(client: Client, page_url: impl Into<String>, config: PollConfig) -> Self {
        Self {
            client,
            page_url: page_url.into(),
            config,
        }
    }

    /// The listing is served differently to non-browser agents, so the request
    /// carries a browser's headers.
    pub async fn fetch_listing(&self) -> Result<String, FetchError> {
        let url = Url::parse(&self.page_url)?;
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));

        get_text(&self.client, url, headers, &self.config).await
    }
}

/// Reads post-match threads and their replies from the forum's JSON listing API.
#[derive(Debug, Clone)]
pub struct ForumClient {
    client: Client,
    api_base: String,
    subreddit: String,
    query: String,
    batch_limit: usize,
    config: PollConfig,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    #[serde(default = "Vec::new")]
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    kind: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    body: String,
}

impl ForumClient {
    pub fn new(client: Client, settings: &ThreadSettings, config: PollConfig) -> Self {
        Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            subreddit: settings.subreddit.clone(),
            query: settings.query.clone(),
            batch_limit: settings.batch_limit,
            config,
        }
    }

    /// Newest threads matching the search query, newest first.
    pub async fn search_recent(&self) -> Result<Vec<ThreadCandidate>, FetchError> {
        let mut url = Url::parse(&format!("{}/r/{}/search.json", self.api_base, self.subreddit))?;
        url.query_pairs_mut()
            .append_pair("q", &self.query)
            .append_pair("restrict_sr", "1")
            .append_pair("sort", "new")
            .append_pair("limit", &self.batch_limit.to_string())
            .append_pair("raw_json", "1");

        let body = get_text(&self.client, url, HeaderMap::new(), &self.config).await?;
        let listing: Listing<PostData> = serde_json::from_str(&body)?;

        let candidates: Vec<ThreadCandidate> = listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .map(|thing| self.candidate_from(thing.data))
            .collect();
        debug!(count = candidates.len(), "fetched thread candidates");
        Ok(candidates)
    }

    /// Bodies of the first `limit` top-level replies, in the forum's "best" order.
    pub async fn top_comments(&self, thread_id: &str, limit: usize) -> Result<Vec<String>, FetchError> {
        let mut url = Url::parse(&format!("{}/comments/{}.json", self.api_base, thread_id))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("depth", "1")
            .append_pair("sort", "confidence")
            .append_pair("raw_json", "1");

        let body = get_text(&self.client, url, HeaderMap::new(), &self.config).await?;
        // [thread listing, comment listing]
        let (_, comments): (serde_json::Value, Listing<serde_json::Value>) =
            serde_json::from_str(&body)?;

        let bodies = comments
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .filter_map(|thing| serde_json::from_value::<CommentData>(thing.data).ok())
            .map(|comment| comment.body)
            .take(limit)
            .collect();
        Ok(bodies)
    }

    fn candidate_from(&self, post: PostData) -> ThreadCandidate {
        let permalink = if post.url.is_empty() {
            format!("{}{}", self.api_base, post.permalink)
        } else {
            post.url
        };
        ThreadCandidate {
            id: post.id,
            title: post.title,
            body: post.selftext,
            permalink,
            comments: Vec::new(),
        }
    }
}

async fn get_text(
    client: &Client,
    url: Url,
    headers: HeaderMap,
    config: &PollConfig,
) -> Result<String, FetchError> {
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        let result = match client
            .get(url.clone())
            .headers(headers.clone())
            .timeout(config.request_timeout)
            .send()
            .await
        {
            Ok(rsp) if rsp.status().is_success() => rsp.text().await.map_err(FetchError::from),
            Ok(rsp) => Err(FetchError::Status(rsp.status().as_u16())),
            Err(e) => Err(FetchError::from(e)),
        };

        match result {
            Ok(body) => return Ok(body),
            Err(e) if attempt < config.max_retries => {
                let backoff = retry_backoff(config.retry_backoff_ms, attempt);
                warn!(url = %url, attempt, error = %e, "request failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
