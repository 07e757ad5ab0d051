//! API controllers
//!
//! Controllers are thin, borrowed views on an [`Sdk`](crate::Sdk) that build
//! requests for one backend controller. Applications can register their own
//! [`Controller`]s next to the built-in ones and address them through
//! [`Sdk::controller_query`](crate::Sdk::controller_query), which hands the
//! request to the controller's [`query`](Controller::query).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::{QueryOptions, Sdk};
use crate::error::{SdkError, SdkResult};
use crate::message::{keys, Request, Response};

mod auth;
mod document;
mod realtime;

pub use auth::{AuthController, TokenValidity};
pub use document::{DocumentController, MGetResult, SearchOptions};
pub use realtime::{NotificationHandler, RealtimeController, RoomRegistry, SubscribeOptions};

/// A backend controller known to the SDK
#[async_trait]
pub trait Controller: Send + Sync {
    /// Name used as the `controller` field of requests
    fn name(&self) -> &str;

    /// Send `action` through this controller
    ///
    /// The default stamps `controller` and `action` on the request and
    /// dispatches it unchanged.
    async fn query(
        &self,
        sdk: &Sdk,
        action: &str,
        request: Request,
        options: QueryOptions,
    ) -> SdkResult<Response> {
        let request = request
            .with(keys::CONTROLLER, self.name())
            .with(keys::ACTION, action);
        sdk.send_request(request, options).await
    }
}

/// A controller identified by its name alone
#[derive(Debug, Clone)]
pub struct NamedController {
    name: String,
}

impl NamedController {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Controller for NamedController {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Controllers registered on an SDK instance
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller. Names must be unique.
    pub fn register(&mut self, controller: Arc<dyn Controller>) -> SdkResult<()> {
        let name = controller.name().to_string();
        if name.is_empty() {
            return Err(SdkError::InvalidArgument(
                "controllers must have a name".to_string(),
            ));
        }
        if self.controllers.contains_key(&name) {
            return Err(SdkError::DuplicateController(name));
        }
        self.controllers.insert(name, controller);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.controllers.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.controllers.keys().cloned().collect()
    }
}
