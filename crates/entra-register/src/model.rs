//! Wire model for the directory's `application` resource.
//!
//! Shapes follow Microsoft Graph (camelCase). Only the fields the reconciler
//! reads are modelled; permission scopes keep any extra fields so that a
//! full-list write never drops data we did not understand.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::{Uuid, uuid};

/// Sign-in audience for applications limited to the home directory.
pub const SIGN_IN_AUDIENCE: &str = "AzureADMyOrg";

/// Machine name of the delegated scope this application exposes.
pub const SCOPE_NAME: &str = "user_impersonation";

/// Consent type for delegated scopes.
pub const USER_CONSENT_TYPE: &str = "User";

/// Microsoft Graph's well-known application id.
pub const GRAPH_RESOURCE_APP_ID: &str = "00000003-0000-0000-c000-000000000000";

/// Graph's delegated `User.Read` permission.
pub const USER_READ_PERMISSION_ID: Uuid = uuid!("e1fe6dd8-ba31-4d61-89e7-88639da4683d");

/// An application registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Directory object id, used for PATCH.
    pub id: String,
    /// Client id.
    pub app_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub sign_in_audience: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifier_uris: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spa: SpaApplication,
    #[serde(default, deserialize_with = "null_as_default")]
    pub api: ApiApplication,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_resource_access: Vec<RequiredResourceAccess>,
}

impl Application {
    pub fn redirect_uris(&self) -> &[String] {
        &self.spa.redirect_uris
    }

    pub fn scopes(&self) -> &[PermissionScope] {
        &self.api.oauth2_permission_scopes
    }

    pub fn resource_access_for(&self, resource_app_id: &str) -> Option<&RequiredResourceAccess> {
        self.required_resource_access
            .iter()
            .find(|r| r.resource_app_id.eq_ignore_ascii_case(resource_app_id))
    }
}

/// Single-page-application platform settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaApplication {
    #[serde(default, deserialize_with = "null_as_default")]
    pub redirect_uris: Vec<String>,
}

/// "Expose an API" settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiApplication {
    #[serde(default, deserialize_with = "null_as_default")]
    pub oauth2_permission_scopes: Vec<PermissionScope>,
}

/// A delegated permission scope defined by an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionScope {
    pub id: Uuid,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub admin_consent_display_name: Option<String>,
    #[serde(default)]
    pub admin_consent_description: Option<String>,
    #[serde(default)]
    pub user_consent_display_name: Option<String>,
    #[serde(default)]
    pub user_consent_description: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(rename = "type", default)]
    pub consent_type: Option<String>,
    /// Fields not modelled above, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PermissionScope {
    /// A new enabled, user-consentable scope with a freshly minted id.
    pub fn delegated(value: &str, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            value: Some(value.to_string()),
            admin_consent_display_name: Some(description.to_string()),
            admin_consent_description: Some(description.to_string()),
            user_consent_display_name: Some(description.to_string()),
            user_consent_description: Some(description.to_string()),
            is_enabled: true,
            consent_type: Some(USER_CONSENT_TYPE.to_string()),
            extra: Map::new(),
        }
    }

    pub fn has_value(&self, value: &str) -> bool {
        self.value.as_deref() == Some(value)
    }
}

/// Permissions this application requests from another resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredResourceAccess {
    pub resource_app_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_access: Vec<ResourceAccess>,
}

impl RequiredResourceAccess {
    pub fn contains(&self, access: &ResourceAccess) -> bool {
        self.resource_access.iter().any(|a| a == access)
    }
}

/// Whether a requested permission is delegated or application-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessType {
    /// Delegated permission.
    Scope,
    /// Application permission.
    Role,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scope => "Scope",
            Self::Role => "Role",
        }
    }
}

/// A single requested permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub access_type: AccessType,
}

impl ResourceAccess {
    pub fn delegated(id: Uuid) -> Self {
        Self {
            id,
            access_type: AccessType::Scope,
        }
    }
}

/// Treats an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
