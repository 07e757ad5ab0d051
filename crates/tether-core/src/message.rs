//! Wire message types
//!
//! Requests are free-form JSON objects (the backend accepts arbitrary
//! top-level arguments such as `index`, `collection`, `scroll` or `from`),
//! so [`Request`] wraps a JSON map with typed accessors for the fields the
//! SDK itself relies on. Responses and notifications have a fixed shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SdkError, SdkResult};

/// A JSON object
pub type JsonObject = serde_json::Map<String, Value>;

/// Request field names
pub mod keys {
    pub const REQUEST_ID: &str = "requestId";
    pub const CONTROLLER: &str = "controller";
    pub const ACTION: &str = "action";
    pub const BODY: &str = "body";
    pub const VOLATILE: &str = "volatile";
    pub const JWT: &str = "jwt";
    pub const INDEX: &str = "index";
    pub const COLLECTION: &str = "collection";
    pub const ID: &str = "_id";
    pub const REFRESH: &str = "refresh";
    pub const RETRY_ON_CONFLICT: &str = "retryOnConflict";
    pub const SCROLL: &str = "scroll";
    pub const SCROLL_ID: &str = "scrollId";
    pub const SIZE: &str = "size";
    pub const FROM: &str = "from";
    pub const SORT: &str = "sort";
    pub const SEARCH_AFTER: &str = "search_after";
    pub const SDK_INSTANCE_ID: &str = "sdkInstanceId";
    pub const SDK_NAME: &str = "sdkName";
}

/// An outbound API request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request(JsonObject);

impl Request {
    /// Create a request for a controller action
    pub fn new(controller: &str, action: &str) -> Self {
        let mut map = JsonObject::new();
        map.insert(keys::CONTROLLER.to_string(), Value::from(controller));
        map.insert(keys::ACTION.to_string(), Value::from(action));
        Self(map)
    }

    /// Build a request from an arbitrary JSON value
    ///
    /// Only JSON objects are valid requests.
    pub fn from_value(value: Value) -> SdkResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SdkError::InvalidArgument(format!(
                "request must be an object, got: {}",
                other
            ))),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style body setter
    pub fn with_body(mut self, body: JsonObject) -> Self {
        self.0.insert(keys::BODY.to_string(), Value::Object(body));
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get_str(keys::REQUEST_ID)
    }

    pub fn controller(&self) -> Option<&str> {
        self.get_str(keys::CONTROLLER)
    }

    pub fn action(&self) -> Option<&str> {
        self.get_str(keys::ACTION)
    }

    pub fn body(&self) -> Option<&JsonObject> {
        self.0.get(keys::BODY).and_then(Value::as_object)
    }

    /// Mutable access to the body, creating an empty one if needed
    pub fn body_mut(&mut self) -> &mut JsonObject {
        let body = self
            .0
            .entry(keys::BODY)
            .or_insert_with(|| Value::Object(JsonObject::new()));
        if !body.is_object() {
            *body = Value::Object(JsonObject::new());
        }
        match body {
            Value::Object(map) => map,
            _ => unreachable!("body was just replaced by an object"),
        }
    }

    /// Integer field, accepting both numbers and numeric strings
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// `controller:action`, for log lines
    pub fn route(&self) -> String {
        format!(
            "{}:{}",
            self.controller().unwrap_or("?"),
            self.action().unwrap_or("?")
        )
    }

    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    pub(crate) fn as_object_mut(&mut self) -> &mut JsonObject {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Error payload of a failed response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub id: Option<String>,
}

impl From<ApiError> for SdkError {
    fn from(error: ApiError) -> Self {
        SdkError::Api {
            status: error.status,
            message: error.message,
            id: error.id,
        }
    }
}

fn default_status() -> u16 {
    200
}

/// A response to a [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<ApiError>,
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub volatile: Option<Value>,
}

impl Response {
    /// A successful response
    pub fn ok(request_id: Option<&str>, result: Value) -> Self {
        Self {
            request_id: request_id.map(str::to_string),
            status: 200,
            result,
            error: None,
            controller: None,
            action: None,
            room: None,
            volatile: None,
        }
    }

    /// A failed response
    pub fn failed(request_id: Option<&str>, error: ApiError) -> Self {
        Self {
            status: error.status,
            error: Some(error),
            ..Self::ok(request_id, Value::Null)
        }
    }

    /// Turn an error payload into an `Err`
    pub fn into_result(self) -> SdkResult<Self> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self),
        }
    }
}

/// Notification category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    #[default]
    #[serde(rename = "document")]
    Document,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "TokenExpired")]
    TokenExpired,
    #[serde(other)]
    Other,
}

/// What happened to the document a notification is about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    Write,
    Delete,
    Publish,
    #[default]
    #[serde(other)]
    Other,
}

/// Document payload of a notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Option<JsonObject>,
}

/// A server push notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub event: NotificationEvent,
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    /// Channel the notification was published on
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub result: NotificationResult,
    #[serde(default)]
    pub volatile: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// A stored document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: JsonObject,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Document {
    pub fn new(id: impl Into<String>, source: JsonObject) -> Self {
        Self {
            id: id.into(),
            source,
            version: None,
        }
    }
}

/// One search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: JsonObject,
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Sort values, when the search was sorted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
}

impl From<Hit> for Document {
    fn from(hit: Hit) -> Self {
        Document::new(hit.id, hit.source)
    }
}

/// One page of search results as returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Hit>,
    #[serde(default)]
    pub total: u64,
    #[serde(rename = "scrollId", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub aggregations: Option<Value>,
}
