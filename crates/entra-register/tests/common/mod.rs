//! In-memory directory used by the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use entra_register::directory::{Directory, op};
use entra_register::model::{Application, ResourceAccess};
use entra_register::{ReconcileError, Result};
use serde_json::{Value, json};
use uuid::Uuid;

/// Stores applications as raw JSON and applies PATCH bodies with JSON merge
/// patch semantics: objects merge, arrays are replaced wholesale. Listing
/// filters by display-name prefix, like `az ad app list --display-name`.
pub struct InMemoryDirectory {
    state: Mutex<State>,
}

struct State {
    apps: Vec<Value>,
    tenant: String,
    authenticated: bool,
    fail_on: Option<&'static str>,
    calls: Vec<&'static str>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                apps: Vec::new(),
                tenant: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
                authenticated: true,
                fail_on: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_tenant(self, tenant: &str) -> Self {
        self.state.lock().unwrap().tenant = tenant.to_string();
        self
    }

    pub fn signed_out(self) -> Self {
        self.state.lock().unwrap().authenticated = false;
        self
    }

    /// Makes every later call to `operation` fail.
    pub fn fail_on(&self, operation: Option<&'static str>) {
        self.state.lock().unwrap().fail_on = operation;
    }

    /// Seeds an application; missing ids are generated. Returns the client id.
    pub fn insert(&self, mut app: Value) -> String {
        let client_id = app["appId"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        app["appId"] = json!(client_id);
        if app.get("id").is_none() {
            app["id"] = json!(Uuid::new_v4().to_string());
        }
        self.state.lock().unwrap().apps.push(app);
        client_id
    }

    pub fn insert_named(&self, display_name: &str) -> String {
        self.insert(json!({ "displayName": display_name }))
    }

    pub fn application(&self, client_id: &str) -> Application {
        let state = self.state.lock().unwrap();
        let app = state
            .apps
            .iter()
            .find(|a| a["appId"] == client_id)
            .expect("application exists");
        serde_json::from_value(app.clone()).unwrap()
    }

    pub fn raw(&self, client_id: &str) -> Value {
        let state = self.state.lock().unwrap();
        state
            .apps
            .iter()
            .find(|a| a["appId"] == client_id)
            .cloned()
            .expect("application exists")
    }

    pub fn apps_named(&self, display_name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .apps
            .iter()
            .filter(|a| a["displayName"] == display_name)
            .count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> usize {
        self.calls()
            .into_iter()
            .filter(|c| {
                [
                    op::CREATE_APPLICATION,
                    op::UPDATE_APPLICATION,
                    op::SET_IDENTIFIER_URIS,
                    op::ADD_PERMISSION,
                ]
                .contains(c)
            })
            .count()
    }

    fn enter(&self, operation: &'static str) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        if state.fail_on == Some(operation) {
            return Err(ReconcileError::external(operation, "injected failure"));
        }
        Ok(state)
    }
}

fn find_mut<'a>(apps: &'a mut [Value], key: &str, value: &str) -> Result<&'a mut Value> {
    apps.iter_mut()
        .find(|a| a[key] == value)
        .ok_or_else(|| ReconcileError::external("lookup", format!("no application with {key} {value}")))
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn preflight(&self) -> Result<()> {
        let state = self.enter(op::CHECK_SIGN_IN)?;
        if !state.authenticated {
            return Err(ReconcileError::NotAuthenticated {
                message: "Please run 'az login' to setup account.".to_string(),
            });
        }
        Ok(())
    }

    async fn list_applications(&self, display_name: &str) -> Result<Vec<Application>> {
        let state = self.enter(op::LIST_APPLICATIONS)?;
        state
            .apps
            .iter()
            .filter(|a| {
                a["displayName"]
                    .as_str()
                    .is_some_and(|n| n.starts_with(display_name))
            })
            .map(|a| {
                serde_json::from_value(a.clone())
                    .map_err(|e| ReconcileError::invalid_response(op::LIST_APPLICATIONS, e))
            })
            .collect()
    }

    async fn create_application(
        &self,
        display_name: &str,
        sign_in_audience: &str,
    ) -> Result<Application> {
        let mut state = self.enter(op::CREATE_APPLICATION)?;
        let app = json!({
            "id": Uuid::new_v4().to_string(),
            "appId": Uuid::new_v4().to_string(),
            "displayName": display_name,
            "signInAudience": sign_in_audience,
            "identifierUris": [],
            "spa": { "redirectUris": [] },
            "api": { "oauth2PermissionScopes": [] },
            "requiredResourceAccess": []
        });
        state.apps.push(app.clone());
        serde_json::from_value(app)
            .map_err(|e| ReconcileError::invalid_response(op::CREATE_APPLICATION, e))
    }

    async fn show_application(&self, client_id: &str) -> Result<Application> {
        let mut state = self.enter(op::SHOW_APPLICATION)?;
        let app = find_mut(&mut state.apps, "appId", client_id)?;
        serde_json::from_value(app.clone())
            .map_err(|e| ReconcileError::invalid_response(op::SHOW_APPLICATION, e))
    }

    async fn patch_application(&self, object_id: &str, body: &Value) -> Result<()> {
        let mut state = self.enter(op::UPDATE_APPLICATION)?;
        let app = find_mut(&mut state.apps, "id", object_id)?;
        json_patch::merge(app, body);
        Ok(())
    }

    async fn set_identifier_uris(&self, client_id: &str, uris: &[String]) -> Result<()> {
        let mut state = self.enter(op::SET_IDENTIFIER_URIS)?;
        let app = find_mut(&mut state.apps, "appId", client_id)?;
        app["identifierUris"] = json!(uris);
        Ok(())
    }

    async fn add_permission(
        &self,
        client_id: &str,
        resource_app_id: &str,
        access: &ResourceAccess,
    ) -> Result<()> {
        let mut state = self.enter(op::ADD_PERMISSION)?;
        let app = find_mut(&mut state.apps, "appId", client_id)?;
        if !app["requiredResourceAccess"].is_array() {
            app["requiredResourceAccess"] = json!([]);
        }
        let required = app["requiredResourceAccess"].as_array_mut().unwrap();
        let entry = match required
            .iter()
            .position(|r| r["resourceAppId"] == resource_app_id)
        {
            Some(i) => &mut required[i],
            None => {
                required.push(json!({ "resourceAppId": resource_app_id, "resourceAccess": [] }));
                required.last_mut().unwrap()
            }
        };
        // Appends blindly so a repeated request shows up as a duplicate.
        entry["resourceAccess"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::to_value(access).unwrap());
        Ok(())
    }

    async fn tenant_id(&self) -> Result<String> {
        let state = self.enter(op::READ_TENANT)?;
        Ok(state.tenant.clone())
    }
}
