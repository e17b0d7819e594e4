//! [`Directory`] backed by the Azure CLI.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::directory::{Directory, op};
use crate::error::{ReconcileError, Result};
use crate::model::{Application, ResourceAccess};
use crate::reconcile::exact_matches;

pub const DEFAULT_AZ: &str = "az";
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

pub struct AzCli {
    program: String,
    graph_url: String,
}

impl AzCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            graph_url: GRAPH_BASE_URL.to_string(),
        }
    }

    /// Graph endpoint used for `az rest` calls.
    pub fn with_graph_url(mut self, graph_url: &str) -> Self {
        self.graph_url = graph_url.trim_end_matches('/').to_string();
        self
    }

    fn missing(&self) -> ReconcileError {
        ReconcileError::MissingDependency {
            tool: self.program.clone(),
        }
    }

    async fn run(&self, operation: &str, args: &[&str]) -> Result<String> {
        let exe = find_on_path(&self.program).unwrap_or_else(|| PathBuf::from(&self.program));
        debug!(operation, program = %exe.display(), ?args, "Invoking az");

        let output = Command::new(&exe)
            .args(args)
            .args(["--output", "json", "--only-show-errors"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => self.missing(),
                _ => ReconcileError::external(operation, e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("az exited with {}", output.status)
            } else {
                stderr
            };
            return Err(ReconcileError::external(operation, message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_json<T: DeserializeOwned>(&self, operation: &str, args: &[&str]) -> Result<T> {
        let stdout = self.run(operation, args).await?;
        parse_output(operation, &stdout)
    }

    /// Bearer token for Microsoft Graph from the signed-in az session.
    pub async fn graph_access_token(&self) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct AccessToken {
            access_token: String,
        }

        let token: AccessToken = self
            .run_json(
                op::ACQUIRE_TOKEN,
                &["account", "get-access-token", "--resource-type", "ms-graph"],
            )
            .await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl Directory for AzCli {
    async fn preflight(&self) -> Result<()> {
        let path = find_on_path(&self.program).ok_or_else(|| self.missing())?;
        debug!(path = %path.display(), "Found az");

        match self.run(op::CHECK_SIGN_IN, &["account", "show"]).await {
            Ok(_) => Ok(()),
            Err(ReconcileError::ExternalCall { message, .. }) => {
                Err(ReconcileError::NotAuthenticated {
                    message: format!("{message} (run `az login` first)"),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn list_applications(&self, display_name: &str) -> Result<Vec<Application>> {
        // `--display-name` is a startswith filter
        let apps = self
            .run_json(
                op::LIST_APPLICATIONS,
                &["ad", "app", "list", "--display-name", display_name],
            )
            .await?;
        Ok(exact_matches(apps, display_name))
    }

    async fn create_application(
        &self,
        display_name: &str,
        sign_in_audience: &str,
    ) -> Result<Application> {
        self.run_json(
            op::CREATE_APPLICATION,
            &[
                "ad",
                "app",
                "create",
                "--display-name",
                display_name,
                "--sign-in-audience",
                sign_in_audience,
            ],
        )
        .await
    }

    async fn show_application(&self, client_id: &str) -> Result<Application> {
        self.run_json(op::SHOW_APPLICATION, &["ad", "app", "show", "--id", client_id])
            .await
    }

    async fn patch_application(&self, object_id: &str, body: &Value) -> Result<()> {
        let uri = format!("{}/applications/{object_id}", self.graph_url);
        let body = body.to_string();
        self.run(
            op::UPDATE_APPLICATION,
            &[
                "rest",
                "--method",
                "PATCH",
                "--uri",
                &uri,
                "--headers",
                "Content-Type=application/json",
                "--body",
                &body,
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_identifier_uris(&self, client_id: &str, uris: &[String]) -> Result<()> {
        let mut args = vec!["ad", "app", "update", "--id", client_id, "--identifier-uris"];
        args.extend(uris.iter().map(String::as_str));
        self.run(op::SET_IDENTIFIER_URIS, &args).await?;
        Ok(())
    }

    async fn add_permission(
        &self,
        client_id: &str,
        resource_app_id: &str,
        access: &ResourceAccess,
    ) -> Result<()> {
        let permission = permission_arg(access);
        self.run(
            op::ADD_PERMISSION,
            &[
                "ad",
                "app",
                "permission",
                "add",
                "--id",
                client_id,
                "--api",
                resource_app_id,
                "--api-permissions",
                &permission,
            ],
        )
        .await?;
        Ok(())
    }

    async fn tenant_id(&self) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Account {
            #[serde(default)]
            tenant_id: Option<String>,
        }

        let account: Account = self.run_json(op::READ_TENANT, &["account", "show"]).await?;
        Ok(account.tenant_id.unwrap_or_default())
    }
}

/// `{id}={type}` as accepted by `az ad app permission add --api-permissions`.
fn permission_arg(access: &ResourceAccess) -> String {
    format!("{}={}", access.id, access.access_type.as_str())
}

/// Decodes az JSON output; empty output (e.g. a 204 from `az rest`) is `null`.
fn parse_output<T: DeserializeOwned>(operation: &str, stdout: &str) -> Result<T> {
    let trimmed = stdout.trim();
    let text = if trimmed.is_empty() { "null" } else { trimmed };
    serde_json::from_str(text).map_err(|e| ReconcileError::invalid_response(operation, e))
}

/// Resolves `program` the way a shell would: paths are checked directly,
/// bare names are searched for in `PATH`.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    find_in(program, env::split_paths(&path))
}

fn find_in(program: &str, dirs: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    dirs.into_iter().find_map(|dir| {
        executable_names(program)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|p| is_executable(p))
    })
}

fn executable_names(program: &str) -> Vec<String> {
    if cfg!(windows) {
        ["", ".cmd", ".exe", ".bat"]
            .iter()
            .map(|ext| format!("{program}{ext}"))
            .collect()
    } else {
        vec![program.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::USER_READ_PERMISSION_ID;

    #[test]
    fn test_permission_arg() {
        let access = ResourceAccess::delegated(USER_READ_PERMISSION_ID);
        assert_eq!(
            permission_arg(&access),
            "e1fe6dd8-ba31-4d61-89e7-88639da4683d=Scope"
        );
    }

    #[test]
    fn test_parse_output_empty_is_null() {
        let value: Value = parse_output("Update application", "  \n").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_parse_output_garbage_is_invalid_response() {
        let err = parse_output::<Vec<Application>>("List applications", "WARNING: hi")
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidResponse { .. }));
        assert!(err.to_string().starts_with("List applications returned"));
    }

    #[test]
    fn test_find_on_path_missing_explicit_path() {
        assert!(find_on_path("/definitely/not/here/az").is_none());
    }

    #[tokio::test]
    async fn test_preflight_missing_tool() {
        let az = AzCli::new("/definitely/not/here/az");
        let err = az.preflight().await.unwrap_err();
        assert!(matches!(err, ReconcileError::MissingDependency { .. }));
    }

    #[cfg(unix)]
    mod fake_az {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        const SCRIPT: &str = r#"#!/bin/sh
case "$1 $2 $3" in
  "account show "*) echo '{"tenantId":"tenant-123","user":{"name":"dev@example.com"}}' ;;
  "ad app list") echo '[{"id":"obj-staging","appId":"client-staging","displayName":"Test App (staging)"},{"id":"obj-real","appId":"client-real","displayName":"Test App"}]' ;;
  "ad app "*) echo "ERROR: Insufficient privileges to complete the operation." >&2; exit 1 ;;
  *) exit 0 ;;
esac
"#;

        fn install(dir: &tempfile::TempDir) -> PathBuf {
            let path = dir.path().join("az");
            fs::write(&path, SCRIPT).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_find_in_directory() {
            let dir = tempfile::tempdir().unwrap();
            let path = install(&dir);
            assert_eq!(find_in("az", vec![dir.path().to_path_buf()]), Some(path));
            assert_eq!(find_in("kubectl", vec![dir.path().to_path_buf()]), None);
        }

        // One test spawns the script so no other thread holds it open for
        // writing at exec time.
        #[tokio::test]
        async fn test_commands_through_fake_az() {
            let dir = tempfile::tempdir().unwrap();
            let path = install(&dir);
            let az = AzCli::new(path.to_string_lossy());

            az.preflight().await.unwrap();
            assert_eq!(az.tenant_id().await.unwrap(), "tenant-123");

            let apps = az.list_applications("Test App").await.unwrap();
            assert_eq!(apps.len(), 1);
            assert_eq!(apps[0].app_id, "client-real");

            az.patch_application("obj-1", &serde_json::json!({"spa": {"redirectUris": []}}))
                .await
                .unwrap();

            let err = az.show_application("client-1").await.unwrap_err();
            match err {
                ReconcileError::ExternalCall { operation, message } => {
                    assert_eq!(operation, op::SHOW_APPLICATION);
                    assert!(message.contains("Insufficient privileges"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
