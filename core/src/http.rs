//! HTTP plumbing shared by REST-backed streams.
//!
//! A stream describes its endpoint through [`HttpStream`]; [`read_pages`]
//! turns that description into a lazy record stream that requests one page
//! at a time and follows the stream's next-page token.

use crate::auth::Authenticator;
use crate::error::{Error, Result};
use crate::stream::RecordStream;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Query pairs for the next request.
pub type PageToken = Vec<(String, String)>;

pub const USER_AGENT: &str = concat!("airsync/", env!("CARGO_PKG_VERSION"));
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = delay_ms.min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(capped)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let inner = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            inner,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GETs `url` and decodes the JSON body. Rate limiting (429) and server
    /// errors are retried with backoff; any other non-2xx is `Error::Http`.
    pub async fn get_json(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
        authenticator: &dyn Authenticator,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let (auth_name, auth_value) = authenticator.auth_header().await?;
            let mut request = self
                .inner
                .get(url)
                .header(auth_name.as_str(), auth_value.as_str());
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if !params.is_empty() {
                request = request.query(params);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    if is_retryable(status) && self.retry.should_retry(attempt) {
                        let delay = retry_after(&response)
                            .map(|d| d.min(self.retry.max_backoff))
                            .unwrap_or_else(|| self.retry.compute_delay(attempt));
                        warn!(url, status = %status, attempt, delay = ?delay, "Retrying request");
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Http {
                        status,
                        url: url.to_string(),
                        body,
                    });
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && self.retry.should_retry(attempt) => {
                    let delay = self.retry.compute_delay(attempt);
                    warn!(url, error = %e, attempt, delay = ?delay, "Retrying request");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Endpoint description of a REST-backed stream.
pub trait HttpStream: Send + Sync {
    /// Base URL ending with `/`; `path()` is appended to it.
    fn url_base(&self) -> &str;

    fn path(&self) -> String;

    fn authenticator(&self) -> &dyn Authenticator;

    fn http_client(&self) -> &HttpClient;

    fn request_params(
        &self,
        _stream_state: Option<&Value>,
        next_page: Option<&PageToken>,
    ) -> Vec<(String, String)> {
        next_page.cloned().unwrap_or_default()
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn next_page_token(&self, response: &Value, stream_state: Option<&Value>) -> Option<PageToken>;

    fn parse_response(&self, response: Value, stream_state: Option<&Value>) -> Vec<Value>;
}

enum Page {
    First,
    Next(PageToken),
    Done,
}

async fn fetch_page<S>(
    stream: &S,
    stream_state: Option<&Value>,
    page: Page,
) -> Result<Option<(Vec<Value>, Page)>>
where
    S: HttpStream + ?Sized,
{
    let token = match page {
        Page::Done => return Ok(None),
        Page::First => None,
        Page::Next(token) => Some(token),
    };

    let url = format!("{}{}", stream.url_base(), stream.path());
    let params = stream.request_params(stream_state, token.as_ref());
    debug!(url = %url, params = ?params, "Requesting page");

    let body = stream
        .http_client()
        .get_json(
            &url,
            &params,
            &stream.request_headers(),
            stream.authenticator(),
        )
        .await?;

    let next = match stream.next_page_token(&body, stream_state) {
        Some(token) => Page::Next(token),
        None => Page::Done,
    };
    let records = stream.parse_response(body, stream_state);
    Ok(Some((records, next)))
}

pub fn read_pages<'a, S>(http_stream: &'a S, stream_state: Option<&'a Value>) -> RecordStream<'a>
where
    S: HttpStream + ?Sized,
{
    stream::try_unfold(Page::First, move |page| {
        fetch_page(http_stream, stream_state, page)
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Value, Error>)))
    .try_flatten()
    .boxed()
}

/// Query pairs of a `next` URL, for APIs that hand back the full next-page link.
pub fn query_pairs(next_url: &str) -> Result<PageToken> {
    let url = reqwest::Url::parse(next_url)
        .map_err(|e| Error::Protocol(format!("Invalid next page URL '{}': {}", next_url, e)))?;
    Ok(url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

/// Records from a response payload: an array yields each element, an object
/// yields itself, null yields nothing.
pub fn records_from(payload: Option<Value>) -> Vec<Value> {
    match payload {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuthenticator;
    use mockito::Server;
    use serde_json::json;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        }
    }

    struct ItemsStream {
        base: String,
        auth: TokenAuthenticator,
        client: HttpClient,
    }

    impl HttpStream for ItemsStream {
        fn url_base(&self) -> &str {
            &self.base
        }

        fn path(&self) -> String {
            "items".into()
        }

        fn authenticator(&self) -> &dyn Authenticator {
            &self.auth
        }

        fn http_client(&self) -> &HttpClient {
            &self.client
        }

        fn next_page_token(&self, response: &Value, _: Option<&Value>) -> Option<PageToken> {
            response
                .get("next")
                .and_then(Value::as_str)
                .and_then(|next| query_pairs(next).ok())
        }

        fn parse_response(&self, response: Value, _: Option<&Value>) -> Vec<Value> {
            records_from(response.get("results").cloned())
        }
    }

    fn items_stream(server: &Server) -> ItemsStream {
        ItemsStream {
            base: format!("{}/", server.url()),
            auth: TokenAuthenticator::new("secret"),
            client: HttpClient::new().unwrap().with_retry_policy(fast_retry()),
        }
    }

    #[test]
    fn test_compute_delay() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.compute_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.compute_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.compute_delay(5), Duration::from_millis(30_000));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn test_records_from() {
        assert_eq!(records_from(Some(json!([1, 2]))), vec![json!(1), json!(2)]);
        assert_eq!(records_from(Some(json!({"id": 1}))), vec![json!({"id": 1})]);
        assert!(records_from(Some(Value::Null)).is_empty());
        assert!(records_from(None).is_empty());
    }

    #[test]
    fn test_query_pairs() {
        let pairs = query_pairs("https://app.posthog.com/api/event?after=2021&offset=100").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("after".to_string(), "2021".to_string()),
                ("offset".to_string(), "100".to_string())
            ]
        );
        assert!(query_pairs("not a url").is_err());
    }

    #[tokio::test]
    async fn test_read_pages_follows_next() {
        let mut server = Server::new_async().await;
        let next = format!("{}/items?offset=2", server.url());
        let first = server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(json!({"results": [{"id": 1}, {"id": 2}], "next": next}).to_string())
            .create_async()
            .await;
        let second = server
            .mock("GET", "/items?offset=2")
            .with_status(200)
            .with_body(json!({"results": [{"id": 3}], "next": null}).to_string())
            .create_async()
            .await;

        let stream = items_stream(&server);
        let records: Vec<Value> = read_pages(&stream, None).try_collect().await.unwrap();

        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_first_record_fetches_one_page() {
        let mut server = Server::new_async().await;
        let next = format!("{}/items?offset=1", server.url());
        let first = server
            .mock("GET", "/items")
            .with_status(200)
            .with_body(json!({"results": [{"id": 1}], "next": next}).to_string())
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/items?offset=1")
            .with_status(200)
            .with_body(json!({"results": []}).to_string())
            .expect(0)
            .create_async()
            .await;

        let stream = items_stream(&server);
        let mut records = read_pages(&stream, None);
        let first_record = records.next().await.unwrap().unwrap();
        assert_eq!(first_record, json!({"id": 1}));
        drop(records);

        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/items")
            .with_status(429)
            .with_body("slow down")
            .expect(3)
            .create_async()
            .await;

        let stream = items_stream(&server);
        let records: Result<Vec<Value>> = read_pages(&stream, None).try_collect().await;
        let err = records.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert!(err.to_string().contains("slow down"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/items")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let stream = items_stream(&server);
        let err = read_pages(&stream, None).next().await.unwrap().unwrap_err();

        assert!(err.is_unauthorized());
        mock.assert_async().await;
    }
}
