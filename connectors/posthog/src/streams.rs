use airsync_core::http::{query_pairs, read_pages, records_from, PageToken};
use airsync_core::stream::{compare_cursor, cursor_value, RecordStream};
use airsync_core::{
    Authenticator, HttpClient, HttpStream, Result, Stream, SyncMode, TokenAuthenticator,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// The PostHog entities a stream can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosthogEntity {
    Annotations,
    Cohorts,
    Events,
    FeatureFlags,
    Insights,
    InsightsPath,
    InsightsSessions,
    Persons,
    Trends,
    /// Current user, used only to check credentials.
    PingMe,
}

impl PosthogEntity {
    pub fn name(&self) -> &'static str {
        match self {
            PosthogEntity::Annotations => "annotations",
            PosthogEntity::Cohorts => "cohorts",
            PosthogEntity::Events => "events",
            PosthogEntity::FeatureFlags => "feature_flags",
            PosthogEntity::Insights => "insights",
            PosthogEntity::InsightsPath => "insights_path",
            PosthogEntity::InsightsSessions => "insights_sessions",
            PosthogEntity::Persons => "persons",
            PosthogEntity::Trends => "trends",
            PosthogEntity::PingMe => "ping_me",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            PosthogEntity::Annotations => "annotation",
            PosthogEntity::Cohorts => "cohort",
            PosthogEntity::Events => "event",
            PosthogEntity::FeatureFlags => "feature_flag",
            PosthogEntity::Insights => "insight",
            PosthogEntity::InsightsPath => "insight/path",
            PosthogEntity::InsightsSessions => "insight/session",
            PosthogEntity::Persons => "person",
            PosthogEntity::Trends => "insight/trend",
            PosthogEntity::PingMe => "users/@me",
        }
    }

    /// Body field holding the records; `None` means the whole body is one record.
    fn data_field(&self) -> Option<&'static str> {
        match self {
            PosthogEntity::InsightsPath | PosthogEntity::InsightsSessions | PosthogEntity::Trends => {
                Some("result")
            }
            PosthogEntity::PingMe => None,
            _ => Some("results"),
        }
    }

    pub fn cursor_field(&self) -> Option<&'static str> {
        match self {
            PosthogEntity::Annotations => Some("updated_at"),
            PosthogEntity::Events => Some("timestamp"),
            _ => None,
        }
    }

    fn schema(&self) -> &'static str {
        match self {
            PosthogEntity::Annotations => include_str!("../schemas/annotations.json"),
            PosthogEntity::Cohorts => include_str!("../schemas/cohorts.json"),
            PosthogEntity::Events => include_str!("../schemas/events.json"),
            PosthogEntity::FeatureFlags => include_str!("../schemas/feature_flags.json"),
            PosthogEntity::Insights => include_str!("../schemas/insights.json"),
            PosthogEntity::InsightsPath => include_str!("../schemas/insights_path.json"),
            PosthogEntity::InsightsSessions => include_str!("../schemas/insights_sessions.json"),
            PosthogEntity::Persons => include_str!("../schemas/persons.json"),
            PosthogEntity::Trends => include_str!("../schemas/trends.json"),
            PosthogEntity::PingMe => include_str!("../schemas/ping_me.json"),
        }
    }
}

/// One PostHog endpoint bound to credentials and a base URL.
#[derive(Debug, Clone)]
pub struct PosthogStream {
    entity: PosthogEntity,
    authenticator: Arc<TokenAuthenticator>,
    base_url: String,
    url_base: String,
    start_date: Option<String>,
    client: HttpClient,
}

impl PosthogStream {
    pub fn new(
        entity: PosthogEntity,
        authenticator: Arc<TokenAuthenticator>,
        base_url: &str,
        client: HttpClient,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            entity,
            authenticator,
            url_base: format!("{}/api/", base_url),
            base_url,
            start_date: None,
            client,
        }
    }

    pub fn with_start_date(mut self, start_date: &str) -> Self {
        self.start_date = Some(start_date.to_string());
        self
    }

    pub fn entity(&self) -> PosthogEntity {
        self.entity
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn start_date(&self) -> Option<&str> {
        self.start_date.as_deref()
    }

    pub fn token_authenticator(&self) -> &Arc<TokenAuthenticator> {
        &self.authenticator
    }

    /// Saved cursor if there is one, otherwise the configured start date.
    fn lower_bound<'a>(&'a self, stream_state: Option<&'a Value>) -> Option<&'a str> {
        let cursor = self.entity.cursor_field()?;
        stream_state
            .and_then(|state| cursor_value(state, cursor))
            .or(self.start_date.as_deref())
    }

    fn is_newer(&self, record: &Value, lower: &str) -> bool {
        self.entity
            .cursor_field()
            .and_then(|cursor| cursor_value(record, cursor))
            .map(|value| compare_cursor(value, lower) == Ordering::Greater)
            .unwrap_or(false)
    }
}

impl PartialEq for PosthogStream {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
            && self.base_url == other.base_url
            && self.start_date == other.start_date
            && self.authenticator == other.authenticator
    }
}

fn set_default(params: &mut Vec<(String, String)>, key: &str, value: &str) {
    if !params.iter().any(|(k, _)| k == key) {
        params.push((key.to_string(), value.to_string()));
    }
}

impl HttpStream for PosthogStream {
    fn url_base(&self) -> &str {
        &self.url_base
    }

    fn path(&self) -> String {
        self.entity.path().to_string()
    }

    fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    fn http_client(&self) -> &HttpClient {
        &self.client
    }

    fn request_params(
        &self,
        stream_state: Option<&Value>,
        next_page: Option<&PageToken>,
    ) -> Vec<(String, String)> {
        let mut params = next_page.cloned().unwrap_or_default();
        match self.entity {
            PosthogEntity::Annotations => set_default(&mut params, "order", "-updated_at"),
            PosthogEntity::Events => {
                if let Some(lower) = self.lower_bound(stream_state) {
                    set_default(&mut params, "after", lower);
                }
            }
            _ => {}
        }
        params
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        vec![("Content-Type".to_string(), "application/json".to_string())]
    }

    fn next_page_token(&self, response: &Value, stream_state: Option<&Value>) -> Option<PageToken> {
        let next = response.get("next").and_then(Value::as_str)?;

        // pages arrive newest first; once a page ends at or before the
        // lower bound there is nothing newer left
        if let Some(lower) = self.lower_bound(stream_state) {
            let last = self
                .entity
                .data_field()
                .and_then(|field| response.get(field))
                .and_then(Value::as_array)
                .and_then(|records| records.last());
            if let Some(last) = last {
                if !self.is_newer(last, lower) {
                    return None;
                }
            }
        }

        query_pairs(next).ok()
    }

    fn parse_response(&self, mut response: Value, stream_state: Option<&Value>) -> Vec<Value> {
        let payload = match self.entity.data_field() {
            Some(field) => response.get_mut(field).map(Value::take),
            None => Some(response),
        };
        let records = records_from(payload);

        match self.lower_bound(stream_state) {
            Some(lower) => records
                .into_iter()
                .filter(|record| self.is_newer(record, lower))
                .collect(),
            None => records,
        }
    }
}

impl Stream for PosthogStream {
    fn name(&self) -> &str {
        self.entity.name()
    }

    fn primary_key(&self) -> Option<Vec<Vec<String>>> {
        Some(vec![vec!["id".to_string()]])
    }

    fn cursor_field(&self) -> Option<&str> {
        self.entity.cursor_field()
    }

    fn json_schema(&self) -> Result<Value> {
        Ok(serde_json::from_str(self.entity.schema())?)
    }

    fn read_records<'a>(
        &'a self,
        _sync_mode: SyncMode,
        stream_state: Option<&'a Value>,
    ) -> RecordStream<'a> {
        read_pages(self, stream_state)
    }
}
