//! `auth` controller
//!
//! Besides building requests, login and logout keep the SDK's logged-in flag
//! and token in sync, which the reconnection logic relies on.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{QueryOptions, Sdk};
use crate::error::{SdkError, SdkResult};
use crate::events::SdkEvent;
use crate::message::{JsonObject, Request};

/// Outcome of a token check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidity {
    pub valid: bool,
    /// Why the token is invalid, when it is
    #[serde(default, alias = "reason")]
    pub state: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Borrowed view on the `auth` controller
pub struct AuthController<'a> {
    sdk: &'a Sdk,
}

impl<'a> AuthController<'a> {
    pub const NAME: &'static str = "auth";

    pub fn new(sdk: &'a Sdk) -> Self {
        Self { sdk }
    }

    /// Check whether a token is valid
    ///
    /// Without a token there is nothing to ask the backend: the answer is
    /// "invalid". The request is never queued.
    pub async fn check_token(&self, token: Option<&str>) -> SdkResult<TokenValidity> {
        let Some(token) = token else {
            return Ok(TokenValidity {
                valid: false,
                state: Some("no token".to_string()),
                expires_at: None,
            });
        };

        let request = Request::new(Self::NAME, "checkToken").with("body", json!({ "token": token }));
        let response = self
            .sdk
            .send_request(request, QueryOptions::not_queuable())
            .await?;
        Ok(serde_json::from_value(response.result)?)
    }

    /// Log in with a strategy, storing the returned token
    ///
    /// On failure the logged-in flag is re-derived from the token the SDK
    /// already holds, which may still be valid.
    pub async fn login(
        &self,
        strategy: &str,
        credentials: JsonObject,
        expires_in: Option<&str>,
    ) -> SdkResult<String> {
        let mut request = Request::new(Self::NAME, "login")
            .with("strategy", strategy)
            .with_body(credentials);
        if let Some(expires_in) = expires_in {
            request.set("expiresIn", expires_in);
        }

        let result = self
            .sdk
            .send_request(request, QueryOptions::not_queuable())
            .await
            .and_then(|response| {
                response
                    .result
                    .get("jwt")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| SdkError::Protocol("login response carries no jwt".to_string()))
            });

        match result {
            Ok(jwt) => {
                self.sdk.set_jwt(Some(jwt.clone()));
                self.sdk.inner.state.set_logged_in(true);
                info!("Logged in with strategy {}", strategy);
                self.sdk.emit(SdkEvent::LoginAttempt {
                    success: true,
                    error: None,
                });
                Ok(jwt)
            }
            Err(e) => {
                warn!("Login with strategy {} failed: {}", strategy, e);
                self.sdk.emit(SdkEvent::LoginAttempt {
                    success: false,
                    error: Some(e.to_string()),
                });
                let current = self.sdk.jwt();
                let still_valid = self
                    .check_token(current.as_deref())
                    .await
                    .map(|validity| validity.valid)
                    .unwrap_or(false);
                self.sdk.inner.state.set_logged_in(still_valid);
                Err(e)
            }
        }
    }

    /// Log out and forget the token
    pub async fn logout(&self) -> SdkResult<()> {
        self.sdk
            .send_request(Request::new(Self::NAME, "logout"), QueryOptions::not_queuable())
            .await?;
        self.sdk.set_jwt(None);
        self.sdk.inner.state.set_logged_in(false);
        debug!("Logged out");
        Ok(())
    }

    /// The user the current token belongs to
    pub async fn get_current_user(&self) -> SdkResult<Value> {
        let response = self
            .sdk
            .send_request(Request::new(Self::NAME, "getCurrentUser"), QueryOptions::default())
            .await?;
        Ok(response.result)
    }
}
