use serde::Serialize;

pub const DEFAULT_APP_NAME: &str = "Diagram Editor";
pub const DEFAULT_FQDN: &str = "localhost";
pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_SCOPE_DESCRIPTION: &str = "Access the application on behalf of the signed-in user";

/// Resolved inputs for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub app_name: String,
    pub fqdn: String,
    pub scheme: String,
    pub scope_description: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            fqdn: DEFAULT_FQDN.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            scope_description: DEFAULT_SCOPE_DESCRIPTION.to_string(),
        }
    }
}

impl Settings {
    /// Builds settings from optional values, already merged from flags and
    /// environment. Missing or empty values fall back to the defaults.
    pub fn resolve(
        app_name: Option<&str>,
        fqdn: Option<&str>,
        scheme: Option<&str>,
        scope_description: Option<&str>,
    ) -> Self {
        Self {
            app_name: non_empty_or(app_name, DEFAULT_APP_NAME),
            fqdn: non_empty_or(fqdn, DEFAULT_FQDN),
            scheme: non_empty_or(scheme, DEFAULT_SCHEME),
            scope_description: non_empty_or(scope_description, DEFAULT_SCOPE_DESCRIPTION),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}://{}", self.scheme, self.fqdn)
    }

    pub fn identifier_uri(client_id: &str) -> String {
        format!("api://{client_id}")
    }
}

fn non_empty_or(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}
