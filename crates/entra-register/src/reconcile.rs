//! The registration reconciler.
//!
//! Brings one application registration to the desired shape with a fixed
//! sequence of read-check-write steps. Each step re-reads the application
//! right before computing its change, and every collection write is a union
//! with what was read, so a run can be repeated safely. The first failing
//! step aborts the run; earlier writes stay applied.

use std::fmt;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::directory::Directory;
use crate::error::{ReconcileError, Result};
use crate::model::{
    Application, GRAPH_RESOURCE_APP_ID, PermissionScope, ResourceAccess, SCOPE_NAME,
    SIGN_IN_AUDIENCE, USER_READ_PERMISSION_ID,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Application,
    RedirectUri,
    IdentifierUri,
    PermissionScope,
    ApiPermission,
    Tenant,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Application => "Application registration",
            Self::RedirectUri => "SPA redirect URI",
            Self::IdentifierUri => "Application ID URI",
            Self::PermissionScope => "Permission scope",
            Self::ApiPermission => "API permission",
            Self::Tenant => "Tenant",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Created,
    Reused,
    Added,
    Set,
    Unchanged,
    Read,
    /// Dry run: the write that would have happened.
    Planned,
}

impl Outcome {
    /// Whether the step wrote to the directory.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Created | Self::Added | Self::Set)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub outcome: Outcome,
    pub detail: String,
}

/// Non-fatal conditions worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    /// Several applications share the display name; the first was used.
    #[serde(rename_all = "camelCase")]
    AmbiguousApplication {
        display_name: String,
        matches: usize,
        chosen_client_id: String,
    },
    /// The permission was requested but may still need admin consent.
    #[serde(rename_all = "camelCase")]
    AdminConsentPending {
        resource_app_id: String,
        permission_id: Uuid,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousApplication {
                display_name,
                matches,
                chosen_client_id,
            } => write!(
                f,
                "{matches} applications are named \"{display_name}\"; using the first one ({chosen_client_id})"
            ),
            Self::AdminConsentPending {
                resource_app_id,
                permission_id,
            } => write!(
                f,
                "Permission {permission_id} on {resource_app_id} was requested; tenant policy may still require admin consent before it can be used"
            ),
        }
    }
}

/// Events delivered while a run is in progress.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'r> {
    Step(&'r StepReport),
    Warning(&'r Warning),
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub settings: Settings,
    /// Absent only in a dry run against a not-yet-created application.
    pub client_id: Option<String>,
    pub object_id: Option<String>,
    pub tenant_id: String,
    pub redirect_uri: String,
    pub identifier_uri: Option<String>,
    pub dry_run: bool,
    pub steps: Vec<StepReport>,
    pub warnings: Vec<Warning>,
}

impl Report {
    pub fn outcome(&self, step: Step) -> Option<Outcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.outcome)
    }

    pub fn writes(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_write()).count()
    }
}

type Observer<'a> = Box<dyn Fn(Progress<'_>) + Send + Sync + 'a>;

pub struct Reconciler<'a, D: Directory + ?Sized> {
    directory: &'a D,
    settings: &'a Settings,
    dry_run: bool,
    observer: Option<Observer<'a>>,
}

/// Identifiers of the application being reconciled.
struct Target {
    client_id: String,
    object_id: String,
}

impl<'a, D: Directory + ?Sized> Reconciler<'a, D> {
    pub fn new(directory: &'a D, settings: &'a Settings) -> Self {
        Self {
            directory,
            settings,
            dry_run: false,
            observer: None,
        }
    }

    /// Read everything, write nothing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Called as each step finishes and each warning is raised.
    pub fn on_progress(mut self, observer: impl Fn(Progress<'_>) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub async fn run(&self) -> Result<Report> {
        self.directory.preflight().await?;

        let mut report = Report {
            settings: self.settings.clone(),
            client_id: None,
            object_id: None,
            tenant_id: String::new(),
            redirect_uri: self.settings.redirect_uri(),
            identifier_uri: None,
            dry_run: self.dry_run,
            steps: Vec::new(),
            warnings: Vec::new(),
        };

        match self.find_or_create_application(&mut report).await? {
            Some(target) => {
                report.client_id = Some(target.client_id.clone());
                report.object_id = Some(target.object_id.clone());
                report.identifier_uri = Some(Settings::identifier_uri(&target.client_id));

                self.reconcile_redirect_uri(&target, &mut report).await?;
                self.set_identifier_uri(&target, &mut report).await?;
                self.reconcile_scope(&target, &mut report).await?;
                self.reconcile_api_permission(&target, &mut report).await?;
            }
            None => {
                let redirect = format!("would add {}", report.redirect_uri);
                self.record(&mut report, Step::RedirectUri, Outcome::Planned, redirect);
                self.record(
                    &mut report,
                    Step::IdentifierUri,
                    Outcome::Planned,
                    "would set api://<client id>".to_string(),
                );
                self.record(
                    &mut report,
                    Step::PermissionScope,
                    Outcome::Planned,
                    format!("would add {SCOPE_NAME}"),
                );
                self.record(
                    &mut report,
                    Step::ApiPermission,
                    Outcome::Planned,
                    format!("would request {USER_READ_PERMISSION_ID} on {GRAPH_RESOURCE_APP_ID}"),
                );
            }
        }

        report.tenant_id = self.read_tenant(&mut report).await?;
        Ok(report)
    }

    async fn find_or_create_application(&self, report: &mut Report) -> Result<Option<Target>> {
        let name = &self.settings.app_name;
        let mut matches = exact_matches(self.directory.list_applications(name).await?, name);
        debug!(display_name = %name, matches = matches.len(), "Looked up application");

        if matches.is_empty() {
            if self.dry_run {
                self.record(
                    report,
                    Step::Application,
                    Outcome::Planned,
                    format!("would create \"{name}\""),
                );
                return Ok(None);
            }
            let app = self
                .directory
                .create_application(name, SIGN_IN_AUDIENCE)
                .await?;
            info!(client_id = %app.app_id, "Created application");
            self.record(
                report,
                Step::Application,
                Outcome::Created,
                format!("created \"{name}\" ({})", app.app_id),
            );
            return Ok(Some(Target::from(app)));
        }

        let count = matches.len();
        let app = matches.swap_remove(0);
        if count > 1 {
            self.raise(
                report,
                Warning::AmbiguousApplication {
                    display_name: name.clone(),
                    matches: count,
                    chosen_client_id: app.app_id.clone(),
                },
            );
        }
        self.record(
            report,
            Step::Application,
            Outcome::Reused,
            format!("found \"{name}\" ({})", app.app_id),
        );
        Ok(Some(Target::from(app)))
    }

    async fn reconcile_redirect_uri(&self, target: &Target, report: &mut Report) -> Result<()> {
        let app = self.directory.show_application(&target.client_id).await?;
        let uri = self.settings.redirect_uri();

        let Some(uris) = union_redirect_uris(app.redirect_uris(), &uri) else {
            self.record(
                report,
                Step::RedirectUri,
                Outcome::Unchanged,
                format!("{uri} already registered"),
            );
            return Ok(());
        };

        if self.dry_run {
            self.record(report, Step::RedirectUri, Outcome::Planned, format!("would add {uri}"));
            return Ok(());
        }

        self.directory
            .patch_application(object_id(&app, target), &json!({ "spa": { "redirectUris": uris } }))
            .await?;
        info!(%uri, total = uris.len(), "Added SPA redirect URI");
        self.record(report, Step::RedirectUri, Outcome::Added, format!("added {uri}"));
        Ok(())
    }

    async fn set_identifier_uri(&self, target: &Target, report: &mut Report) -> Result<()> {
        let uri = Settings::identifier_uri(&target.client_id);
        if self.dry_run {
            self.record(report, Step::IdentifierUri, Outcome::Planned, format!("would set {uri}"));
            return Ok(());
        }
        self.directory
            .set_identifier_uris(&target.client_id, std::slice::from_ref(&uri))
            .await?;
        info!(%uri, "Set application ID URI");
        self.record(report, Step::IdentifierUri, Outcome::Set, format!("set {uri}"));
        Ok(())
    }

    async fn reconcile_scope(&self, target: &Target, report: &mut Report) -> Result<()> {
        let app = self.directory.show_application(&target.client_id).await?;
        let description = &self.settings.scope_description;

        let Some(scopes) = union_scopes(app.scopes(), SCOPE_NAME, || {
            PermissionScope::delegated(SCOPE_NAME, description)
        }) else {
            self.record(
                report,
                Step::PermissionScope,
                Outcome::Unchanged,
                format!("{SCOPE_NAME} already exposed"),
            );
            return Ok(());
        };

        if self.dry_run {
            self.record(
                report,
                Step::PermissionScope,
                Outcome::Planned,
                format!("would add {SCOPE_NAME}"),
            );
            return Ok(());
        }

        self.directory
            .patch_application(
                object_id(&app, target),
                &json!({ "api": { "oauth2PermissionScopes": scopes } }),
            )
            .await?;
        info!(scope = SCOPE_NAME, "Added permission scope");
        self.record(
            report,
            Step::PermissionScope,
            Outcome::Added,
            format!("added {SCOPE_NAME}"),
        );
        Ok(())
    }

    async fn reconcile_api_permission(&self, target: &Target, report: &mut Report) -> Result<()> {
        let app = self.directory.show_application(&target.client_id).await?;
        let access = ResourceAccess::delegated(USER_READ_PERMISSION_ID);

        if has_permission(&app, GRAPH_RESOURCE_APP_ID, &access) {
            self.record(
                report,
                Step::ApiPermission,
                Outcome::Unchanged,
                "Microsoft Graph User.Read already requested".to_string(),
            );
            return Ok(());
        }

        if self.dry_run {
            self.record(
                report,
                Step::ApiPermission,
                Outcome::Planned,
                "would request Microsoft Graph User.Read".to_string(),
            );
            return Ok(());
        }

        self.directory
            .add_permission(&target.client_id, GRAPH_RESOURCE_APP_ID, &access)
            .await?;
        info!(permission = %access.id, "Requested API permission");
        self.record(
            report,
            Step::ApiPermission,
            Outcome::Added,
            "requested Microsoft Graph User.Read".to_string(),
        );
        self.raise(
            report,
            Warning::AdminConsentPending {
                resource_app_id: GRAPH_RESOURCE_APP_ID.to_string(),
                permission_id: access.id,
            },
        );
        Ok(())
    }

    async fn read_tenant(&self, report: &mut Report) -> Result<String> {
        let tenant = self.directory.tenant_id().await?;
        let tenant = tenant.trim();
        if tenant.is_empty() {
            return Err(ReconcileError::EmptyTenant);
        }
        self.record(report, Step::Tenant, Outcome::Read, tenant.to_string());
        Ok(tenant.to_string())
    }

    fn record(&self, report: &mut Report, step: Step, outcome: Outcome, detail: String) {
        let entry = StepReport {
            step,
            outcome,
            detail,
        };
        if let Some(observer) = &self.observer {
            observer(Progress::Step(&entry));
        }
        report.steps.push(entry);
    }

    fn raise(&self, report: &mut Report, warning: Warning) {
        info!("{warning}");
        if let Some(observer) = &self.observer {
            observer(Progress::Warning(&warning));
        }
        report.warnings.push(warning);
    }
}

impl From<Application> for Target {
    fn from(app: Application) -> Self {
        Self {
            client_id: app.app_id,
            object_id: app.id,
        }
    }
}

/// Object id from a fresh read, falling back to the one found in step 1.
fn object_id<'a>(app: &'a Application, target: &'a Target) -> &'a str {
    if app.id.is_empty() {
        &target.object_id
    } else {
        &app.id
    }
}

/// Keeps applications whose display name equals `name` byte for byte. Provider
/// filters are looser (`az` matches prefixes, Graph ignores case).
pub fn exact_matches(apps: Vec<Application>, name: &str) -> Vec<Application> {
    apps.into_iter()
        .filter(|a| a.display_name.as_deref() == Some(name))
        .collect()
}

/// The redirect list with `uri` appended, or `None` if it is already present.
pub fn union_redirect_uris(current: &[String], uri: &str) -> Option<Vec<String>> {
    if current.iter().any(|u| u == uri) {
        return None;
    }
    let mut uris = current.to_vec();
    uris.push(uri.to_string());
    Some(uris)
}

/// The scope list with a newly minted `name` scope appended, or `None` if a
/// scope with that value already exists. `mint` only runs when needed, so an
/// existing scope keeps its id.
pub fn union_scopes(
    current: &[PermissionScope],
    name: &str,
    mint: impl FnOnce() -> PermissionScope,
) -> Option<Vec<PermissionScope>> {
    if current.iter().any(|s| s.has_value(name)) {
        return None;
    }
    let mut scopes = current.to_vec();
    scopes.push(mint());
    Some(scopes)
}

pub fn has_permission(app: &Application, resource_app_id: &str, access: &ResourceAccess) -> bool {
    app.resource_access_for(resource_app_id)
        .is_some_and(|entry| entry.contains(access))
}
