//! Wikimedia HTTP client for the top-pageviews report and the action API.
//!
//! The pipeline only depends on the [`PageviewSource`] trait, so tests and
//! alternative sources can stand in for [`WikimediaClient`].
//!
//! # Failure model
//!
//! Every request is a single attempt bounded by the configured timeout.
//! Transport errors, non-success statuses and undecodable bodies are logged
//! and collapse to `None`; callers treat `None` as "no data for this date"
//! and stop. Retrying is left to whatever schedules the run.

use crate::error::FetchError;
use crate::models::TopPageviewsResponse;
use crate::utils::truncate_for_log;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const DEFAULT_PAGEVIEWS_URL: &str =
    "https://wikimedia.org/api/rest_v1/metrics/pageviews/top/en.wikipedia/all-access/";
pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const DEFAULT_USER_AGENT: &str = "CuriosityIndexBot/0.1 (https://github.com/vtasca)";

/// Source of daily top-pageviews reports.
pub trait PageviewSource {
    /// Fetch the report for `date` (`YYYY/MM/DD`). `None` means no usable
    /// data for that date.
    async fn fetch_top_pageviews(&self, date: &str) -> Option<TopPageviewsResponse>;
}

/// Connection settings for [`WikimediaClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub pageviews_url: String,
    pub api_url: String,
    pub user_agent: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            pageviews_url: DEFAULT_PAGEVIEWS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            access_token: None,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Blocking-per-request client for the Wikimedia endpoints.
#[derive(Debug, Clone)]
pub struct WikimediaClient {
    http: reqwest::Client,
    pageviews_base: Url,
    api_url: Url,
}

impl WikimediaClient {
    /// Build a client carrying the user agent, optional bearer token and
    /// request timeout from `settings`.
    pub fn new(settings: &ClientSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = settings.access_token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| FetchError::Header("Authorization"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(FetchError::Client)?;

        // `Url::join` drops the last path segment unless it ends in '/'.
        let mut base = settings.pageviews_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            http,
            pageviews_base: parse_url(&base)?,
            api_url: parse_url(&settings.api_url)?,
        })
    }

    /// The report URL for `date`, e.g. `.../all-access/2024/01/10`.
    pub fn pageviews_url(&self, date: &str) -> Option<Url> {
        self.pageviews_base.join(date).ok()
    }

    /// Category listing for one article via the action API.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_article_categories(&self, title: &str) -> Option<serde_json::Value> {
        let url = self.action_url(&[
            ("action", "query"),
            ("titles", title),
            ("prop", "categories"),
            ("format", "json"),
            ("cllimit", "max"),
        ]);
        self.get_json(url).await
    }

    /// Plain-text extract for one article via the action API.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_article_text(&self, title: &str) -> Option<serde_json::Value> {
        let url = self.action_url(&[
            ("action", "query"),
            ("titles", title),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("format", "json"),
            ("exsectionformat", "plain"),
        ]);
        self.get_json(url).await
    }

    fn action_url(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut().extend_pairs(params);
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Option<T> {
        let t0 = Instant::now();
        let response = match self.http.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    %url,
                    timeout = e.is_timeout(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    error = %e,
                    "Request failed"
                );
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Non-success response");
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "Failed reading response body");
                return None;
            }
        };

        match serde_json::from_str::<T>(&body) {
            Ok(parsed) => {
                debug!(
                    %url,
                    bytes = body.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Decoded response"
                );
                Some(parsed)
            }
            Err(e) => {
                warn!(
                    %url,
                    error = %e,
                    body_preview = %truncate_for_log(&body, 300),
                    "Response did not match the expected shape"
                );
                None
            }
        }
    }
}

impl PageviewSource for WikimediaClient {
    #[instrument(level = "info", skip(self))]
    async fn fetch_top_pageviews(&self, date: &str) -> Option<TopPageviewsResponse> {
        let Some(url) = self.pageviews_url(date) else {
            warn!(date, "Could not build report URL");
            return None;
        };
        let report: Option<TopPageviewsResponse> = self.get_json(url).await;
        if let Some(ref r) = report {
            info!(entries = r.articles().len(), "Fetched top pageviews");
        }
        report
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|source| FetchError::Url {
        url: raw.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> ClientSettings {
        ClientSettings {
            pageviews_url: format!("{}/top/en.wikipedia/all-access", server.uri()),
            api_url: format!("{}/w/api.php", server.uri()),
            user_agent: "curiosity-test/1.0".to_string(),
            access_token: Some("secret".to_string()),
            timeout: Duration::from_secs(2),
        }
    }

    fn report_body() -> serde_json::Value {
        serde_json::json!({
            "items": [{
                "articles": [
                    {"article": "Cat", "views": 500, "rank": 1},
                    {"article": "User:Bob", "views": 10, "rank": 2}
                ]
            }]
        })
    }

    #[test]
    fn test_pageviews_url_appends_date() {
        let client = WikimediaClient::new(&ClientSettings::default()).unwrap();
        let url = client.pageviews_url("2024/01/10").unwrap();
        assert_eq!(
            url.as_str(),
            "https://wikimedia.org/api/rest_v1/metrics/pageviews/top/en.wikipedia/all-access/2024/01/10"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let settings = ClientSettings {
            api_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            WikimediaClient::new(&settings),
            Err(FetchError::Url { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_top_pageviews_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/top/en.wikipedia/all-access/2024/01/10"))
            .and(header("authorization", "Bearer secret"))
            .and(header("user-agent", "curiosity-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(report_body()))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&settings_for(&server)).unwrap();
        let report = client.fetch_top_pageviews("2024/01/10").await.unwrap();
        assert_eq!(report.articles().len(), 2);
        assert_eq!(report.articles()[0].article, "Cat");
    }

    #[tokio::test]
    async fn test_fetch_top_pageviews_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&settings_for(&server)).unwrap();
        assert!(client.fetch_top_pageviews("2024/01/10").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_top_pageviews_malformed_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"items\": [oops"))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&settings_for(&server)).unwrap();
        assert!(client.fetch_top_pageviews("2024/01/10").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_top_pageviews_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(report_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let settings = ClientSettings {
            timeout: Duration::from_millis(300),
            ..settings_for(&server)
        };
        let client = WikimediaClient::new(&settings).unwrap();
        assert!(client.fetch_top_pageviews("2024/01/10").await.is_none());
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(report_body()))
            .mount(&server)
            .await;

        let settings = ClientSettings {
            access_token: None,
            ..settings_for(&server)
        };
        let client = WikimediaClient::new(&settings).unwrap();
        assert!(client.fetch_top_pageviews("2024/01/10").await.is_some());
    }

    #[tokio::test]
    async fn test_fetch_article_categories_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "query"))
            .and(query_param("titles", "Cat"))
            .and(query_param("prop", "categories"))
            .and(query_param("cllimit", "max"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"pages": {"1": {"title": "Cat", "categories": [{"title": "Category:Felines"}]}}}
            })))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&settings_for(&server)).unwrap();
        let json = client.fetch_article_categories("Cat").await.unwrap();
        assert_eq!(
            json["query"]["pages"]["1"]["categories"][0]["title"],
            "Category:Felines"
        );
    }

    #[tokio::test]
    async fn test_fetch_article_text_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts"))
            .and(query_param("explaintext", "1"))
            .and(query_param("exsectionformat", "plain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"pages": {"1": {"title": "Cat", "extract": "The cat is a small mammal."}}}
            })))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&settings_for(&server)).unwrap();
        let json = client.fetch_article_text("Cat").await.unwrap();
        assert_eq!(
            json["query"]["pages"]["1"]["extract"],
            "The cat is a small mammal."
        );
    }

    #[tokio::test]
    async fn test_fetch_article_text_server_error_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&settings_for(&server)).unwrap();
        assert!(client.fetch_article_text("Cat").await.is_none());
    }
}
