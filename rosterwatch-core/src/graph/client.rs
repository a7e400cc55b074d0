use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ApiSection;
use crate::roster::{EntityRecord, EntitySnapshot};
use crate::session::Credential;

use super::error::{GraphError, GraphResult};
use super::method::{ApiMethod, ApiRequest};

/// Error codes meaning the token itself is not allowed to make the call:
/// user, group and application authorization failures.
const PERMISSION_CODES: [i64; 3] = [5, 27, 28];

#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn call(&self, credential: &Credential, request: ApiRequest) -> GraphResult<Value>;
}

#[derive(Debug, Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    version: String,
}

impl GraphClient {
    pub fn new(config: &ApiSection) -> GraphResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.version.clone(),
        })
    }

    fn endpoint(&self, method: ApiMethod) -> String {
        format!("{}/method/{}", self.base_url, method.name())
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn call(&self, credential: &Credential, request: ApiRequest) -> GraphResult<Value> {
        let method = request.method();
        let mut form: Vec<(&str, &str)> = request
            .params()
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        form.push(("access_token", credential.expose()));
        form.push(("v", self.version.as_str()));

        debug!(%method, params = request.params().len(), "calling api");
        let response = self
            .client
            .post(self.endpoint(method))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            warn!(%method, %status, "api answered with non-success status");
        }
        unwrap_envelope(method, body)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Option<Value>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

fn unwrap_envelope(method: ApiMethod, body: Value) -> GraphResult<Value> {
    let envelope: Envelope = serde_json::from_value(body)?;
    if let Some(error) = envelope.error {
        let ErrorBody {
            error_code: code,
            error_msg: message,
        } = error;
        warn!(%method, code, %message, "api call rejected");
        return Err(if PERMISSION_CODES.contains(&code) {
            GraphError::Permission { code, message }
        } else {
            GraphError::Api { code, message }
        });
    }
    envelope
        .response
        .ok_or_else(|| GraphError::Unexpected(format!("{method}: neither response nor error")))
}

#[derive(Debug, Deserialize)]
struct FriendsPage {
    count: u64,
    #[serde(default)]
    items: Vec<FriendItem>,
}

#[derive(Debug, Deserialize)]
struct FriendItem {
    id: i64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

impl From<FriendItem> for EntityRecord {
    fn from(item: FriendItem) -> Self {
        let label = format!("{} {}", item.first_name, item.last_name);
        EntityRecord::new(item.id.to_string(), label.trim())
    }
}

/// Fetches the owner's full entity list, one `friends.get` page at a time.
pub async fn fetch_entities(
    api: &dyn GraphApi,
    credential: &Credential,
    owner_id: &str,
    page_size: u32,
) -> GraphResult<EntitySnapshot> {
    let mut snapshot = EntitySnapshot::new();
    let mut offset: u64 = 0;
    loop {
        let request = ApiRequest::new(ApiMethod::FriendsGet)
            .param("user_id", owner_id)
            .param("fields", "nickname")
            .param("count", page_size)
            .param("offset", offset);
        let page: FriendsPage = serde_json::from_value(api.call(credential, request).await?)?;
        let received = page.items.len() as u64;
        for item in page.items {
            snapshot.insert(item.into());
        }
        offset += received;
        debug!(offset, total = page.count, "entity page received");
        if received == 0 || offset >= page.count {
            break;
        }
    }
    info!(owner_id, entities = snapshot.len(), "entity list fetched");
    Ok(snapshot)
}
