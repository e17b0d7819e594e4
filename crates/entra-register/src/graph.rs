//! [`Directory`] backed by the Microsoft Graph REST API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::directory::{Directory, op};
use crate::error::{ReconcileError, Result};
use crate::model::{Application, RequiredResourceAccess, ResourceAccess};

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GraphClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
    }

    async fn send(&self, operation: &str, req: RequestBuilder) -> Result<Response> {
        debug!(operation, "Calling Microsoft Graph");
        let resp = req
            .send()
            .await
            .map_err(|e| ReconcileError::external(operation, format!("request failed: {e}")))?;
        check_status(operation, resp).await
    }

    async fn send_json<T: DeserializeOwned>(&self, operation: &str, req: RequestBuilder) -> Result<T> {
        let resp = self.send(operation, req).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| ReconcileError::external(operation, format!("reading response: {e}")))?;
        serde_json::from_str(&body).map_err(|e| ReconcileError::invalid_response(operation, e))
    }

    async fn object_id(&self, client_id: &str) -> Result<String> {
        Ok(self.show_application(client_id).await?.id)
    }
}

#[async_trait]
impl Directory for GraphClient {
    async fn preflight(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(ReconcileError::NotAuthenticated {
                message: "no Graph access token available".to_string(),
            });
        }
        match self.tenant_id().await {
            Ok(_) | Err(ReconcileError::EmptyTenant) => Ok(()),
            Err(ReconcileError::ExternalCall { message, .. }) if message.starts_with("HTTP 401") => {
                Err(ReconcileError::NotAuthenticated { message })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_applications(&self, display_name: &str) -> Result<Vec<Application>> {
        let filter = format!("displayName eq '{}'", display_name.replace('\'', "''"));
        let page: Collection<Application> = self
            .send_json(
                op::LIST_APPLICATIONS,
                self.request(Method::GET, "applications")
                    .query(&[("$filter", filter.as_str())]),
            )
            .await?;
        Ok(page.value)
    }

    async fn create_application(
        &self,
        display_name: &str,
        sign_in_audience: &str,
    ) -> Result<Application> {
        let body = json!({
            "displayName": display_name,
            "signInAudience": sign_in_audience,
        });
        self.send_json(
            op::CREATE_APPLICATION,
            self.request(Method::POST, "applications").json(&body),
        )
        .await
    }

    async fn show_application(&self, client_id: &str) -> Result<Application> {
        let path = format!("applications(appId='{client_id}')");
        self.send_json(op::SHOW_APPLICATION, self.request(Method::GET, &path))
            .await
    }

    async fn patch_application(&self, object_id: &str, body: &Value) -> Result<()> {
        let path = format!("applications/{object_id}");
        self.send(
            op::UPDATE_APPLICATION,
            self.request(Method::PATCH, &path).json(body),
        )
        .await?;
        Ok(())
    }

    async fn set_identifier_uris(&self, client_id: &str, uris: &[String]) -> Result<()> {
        let object_id = self.object_id(client_id).await?;
        let path = format!("applications/{object_id}");
        self.send(
            op::SET_IDENTIFIER_URIS,
            self.request(Method::PATCH, &path)
                .json(&json!({ "identifierUris": uris })),
        )
        .await?;
        Ok(())
    }

    async fn add_permission(
        &self,
        client_id: &str,
        resource_app_id: &str,
        access: &ResourceAccess,
    ) -> Result<()> {
        let app = self.show_application(client_id).await?;
        let Some(required) = with_permission(app.required_resource_access, resource_app_id, access)
        else {
            return Ok(());
        };
        let path = format!("applications/{}", app.id);
        self.send(
            op::ADD_PERMISSION,
            self.request(Method::PATCH, &path)
                .json(&json!({ "requiredResourceAccess": required })),
        )
        .await?;
        Ok(())
    }

    async fn tenant_id(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct Organization {
            id: String,
        }

        let orgs: Collection<Organization> = self
            .send_json(
                op::READ_TENANT,
                self.request(Method::GET, "organization")
                    .query(&[("$select", "id")]),
            )
            .await?;
        orgs.value
            .into_iter()
            .next()
            .map(|o| o.id)
            .filter(|id| !id.is_empty())
            .ok_or(ReconcileError::EmptyTenant)
    }
}

/// Adds `access` under `resource_app_id`, returning the full list to write,
/// or `None` when it is already requested.
fn with_permission(
    mut required: Vec<RequiredResourceAccess>,
    resource_app_id: &str,
    access: &ResourceAccess,
) -> Option<Vec<RequiredResourceAccess>> {
    let existing = required
        .iter()
        .position(|r| r.resource_app_id.eq_ignore_ascii_case(resource_app_id));
    match existing {
        Some(i) if required[i].contains(access) => return None,
        Some(i) => required[i].resource_access.push(*access),
        None => required.push(RequiredResourceAccess {
            resource_app_id: resource_app_id.to_string(),
            resource_access: vec![*access],
        }),
    }
    Some(required)
}

async fn check_status(operation: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ReconcileError::external(operation, describe_failure(status, &body)))
}

/// Formats a failed Graph response, preferring its `error` object.
fn describe_failure(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body)
        && let Some(error) = json.get("error")
    {
        let code = error.get("code").and_then(|v| v.as_str());
        let message = error.get("message").and_then(|v| v.as_str());
        match (code, message) {
            (Some(code), Some(message)) => return format!("HTTP {status}: {code}: {message}"),
            (None, Some(message)) => return format!("HTTP {status}: {message}"),
            _ => {}
        }
    }
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}
