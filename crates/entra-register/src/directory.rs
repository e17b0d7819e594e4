//! The identity provider's management surface, as seen by the reconciler.
//!
//! Two implementations exist: [`crate::az::AzCli`] drives the Azure CLI and
//! [`crate::graph::GraphClient`] talks to Microsoft Graph over HTTP.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{Application, ResourceAccess};

/// Operation names used in progress output and error messages.
pub mod op {
    pub const CHECK_SIGN_IN: &str = "Check sign-in";
    pub const LIST_APPLICATIONS: &str = "List applications";
    pub const CREATE_APPLICATION: &str = "Create application";
    pub const SHOW_APPLICATION: &str = "Show application";
    pub const UPDATE_APPLICATION: &str = "Update application";
    pub const SET_IDENTIFIER_URIS: &str = "Set identifier URIs";
    pub const ADD_PERMISSION: &str = "Add API permission";
    pub const READ_TENANT: &str = "Read tenant";
    pub const ACQUIRE_TOKEN: &str = "Acquire Graph access token";
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Checks that the backend can be used at all. Runs before any mutation.
    async fn preflight(&self) -> Result<()>;

    /// Applications whose display name matches exactly, in provider order.
    async fn list_applications(&self, display_name: &str) -> Result<Vec<Application>>;

    async fn create_application(
        &self,
        display_name: &str,
        sign_in_audience: &str,
    ) -> Result<Application>;

    /// Fetches an application by client id.
    async fn show_application(&self, client_id: &str) -> Result<Application>;

    /// PATCHes the application with `body`. Collections in the body replace
    /// the stored collections wholesale.
    async fn patch_application(&self, object_id: &str, body: &Value) -> Result<()>;

    async fn set_identifier_uris(&self, client_id: &str, uris: &[String]) -> Result<()>;

    /// Requests `access` on the resource application `resource_app_id`.
    async fn add_permission(
        &self,
        client_id: &str,
        resource_app_id: &str,
        access: &ResourceAccess,
    ) -> Result<()>;

    /// Tenant of the signed-in session.
    async fn tenant_id(&self) -> Result<String>;
}
