use airsync_core::http::{read_pages, records_from, PageToken};
use airsync_core::stream::{cursor_value, RecordStream};
use airsync_core::{Authenticator, HttpClient, HttpStream, Result, Stream, SyncMode};
use serde_json::Value;
use std::sync::Arc;

const PAGE_SIZE: u32 = 100;
const CURSOR_FIELD: &str = "updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SalesloftEntity {
    Accounts,
    Cadences,
    CadenceMemberships,
    Calls,
    Emails,
    People,
    Users,
}

impl SalesloftEntity {
    pub fn name(&self) -> &'static str {
        match self {
            SalesloftEntity::Accounts => "accounts",
            SalesloftEntity::Cadences => "cadences",
            SalesloftEntity::CadenceMemberships => "cadence_memberships",
            SalesloftEntity::Calls => "calls",
            SalesloftEntity::Emails => "emails",
            SalesloftEntity::People => "people",
            SalesloftEntity::Users => "users",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            SalesloftEntity::Accounts => "accounts.json",
            SalesloftEntity::Cadences => "cadences.json",
            SalesloftEntity::CadenceMemberships => "cadence_memberships.json",
            SalesloftEntity::Calls => "activities/calls.json",
            SalesloftEntity::Emails => "activities/emails.json",
            SalesloftEntity::People => "people.json",
            SalesloftEntity::Users => "users.json",
        }
    }

    pub fn is_incremental(&self) -> bool {
        !matches!(self, SalesloftEntity::Users)
    }

    fn schema(&self) -> &'static str {
        match self {
            SalesloftEntity::Accounts => include_str!("../schemas/accounts.json"),
            SalesloftEntity::Cadences => include_str!("../schemas/cadences.json"),
            SalesloftEntity::CadenceMemberships => {
                include_str!("../schemas/cadence_memberships.json")
            }
            SalesloftEntity::Calls => include_str!("../schemas/calls.json"),
            SalesloftEntity::Emails => include_str!("../schemas/emails.json"),
            SalesloftEntity::People => include_str!("../schemas/people.json"),
            SalesloftEntity::Users => include_str!("../schemas/users.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SalesloftStream {
    entity: SalesloftEntity,
    authenticator: Arc<dyn Authenticator>,
    url_base: String,
    start_date: String,
    client: HttpClient,
}

impl SalesloftStream {
    pub fn new(
        entity: SalesloftEntity,
        authenticator: Arc<dyn Authenticator>,
        url_base: &str,
        start_date: &str,
        client: HttpClient,
    ) -> Self {
        Self {
            entity,
            authenticator,
            url_base: url_base.to_string(),
            start_date: start_date.to_string(),
            client,
        }
    }

    pub fn entity(&self) -> SalesloftEntity {
        self.entity
    }

    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    pub fn shared_authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }
}

impl PartialEq for SalesloftStream {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
            && self.url_base == other.url_base
            && self.start_date == other.start_date
            && Arc::ptr_eq(&self.authenticator, &other.authenticator)
    }
}

impl HttpStream for SalesloftStream {
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
        let mut params = vec![("per_page".to_string(), PAGE_SIZE.to_string())];
        if let Some(token) = next_page {
            params.extend(token.iter().cloned());
        }
        if self.entity.is_incremental() {
            let lower = stream_state
                .and_then(|state| cursor_value(state, CURSOR_FIELD))
                .unwrap_or(self.start_date.as_str());
            params.push(("sort_by".to_string(), CURSOR_FIELD.to_string()));
            params.push(("sort_direction".to_string(), "ASC".to_string()));
            params.push(("updated_at[gt]".to_string(), lower.to_string()));
        }
        params
    }

    fn next_page_token(&self, response: &Value, _stream_state: Option<&Value>) -> Option<PageToken> {
        let next = response.pointer("/metadata/paging/next_page")?;
        let page = match next {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return None,
        };
        Some(vec![("page".to_string(), page)])
    }

    fn parse_response(&self, mut response: Value, _stream_state: Option<&Value>) -> Vec<Value> {
        records_from(response.get_mut("data").map(Value::take))
    }
}

impl Stream for SalesloftStream {
    fn name(&self) -> &str {
        self.entity.name()
    }

    fn primary_key(&self) -> Option<Vec<Vec<String>>> {
        Some(vec![vec!["id".to_string()]])
    }

    fn cursor_field(&self) -> Option<&str> {
        self.entity.is_incremental().then_some(CURSOR_FIELD)
    }

    fn json_schema(&self) -> Result<Value> {
        Ok(serde_json::from_str(self.entity.schema())?)
    }

    // sorted ascending by cursor, one checkpoint per page
    fn state_checkpoint_interval(&self) -> Option<usize> {
        self.entity.is_incremental().then_some(PAGE_SIZE as usize)
    }

    fn read_records<'a>(
        &'a self,
        _sync_mode: SyncMode,
        stream_state: Option<&'a Value>,
    ) -> RecordStream<'a> {
        read_pages(self, stream_state)
    }
}
