//! Terminal output. Progress goes to stderr so stdout carries only the
//! summary, ready to be redirected into an env file.

use clap::ValueEnum;
use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::model::SCOPE_NAME;
use crate::reconcile::{Outcome, Progress, Report, StepReport};

pub const TENANT_ID_KEY: &str = "ENTRA_TENANT_ID";
pub const CLIENT_ID_KEY: &str = "ENTRA_CLIENT_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// KEY=value lines for an env file
    #[default]
    Env,
    /// The full run report as JSON
    Json,
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg.yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_progress(progress: Progress<'_>) {
    match progress {
        Progress::Step(step) => print_step(step),
        Progress::Warning(warning) => print_warning(&warning.to_string()),
    }
}

fn print_step(step: &StepReport) {
    let marker = match step.outcome {
        Outcome::Unchanged | Outcome::Read | Outcome::Reused => "·".dimmed(),
        Outcome::Planned => "~".cyan(),
        Outcome::Created | Outcome::Added | Outcome::Set => "✓".green(),
    };
    eprintln!("{} {}: {}", marker, step.step.label().cyan(), step.detail);
}

pub fn print_summary(report: &Report, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Env => {
            println!("{}", render_env(report));
            eprintln!();
            eprintln!("{}", render_recap(report));
            if report.dry_run {
                print_warning("Dry run: no changes were made");
            } else {
                print_success("Copy the values above into your .env file");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// The two values the consuming application needs, as `KEY=value` lines.
pub fn render_env(report: &Report) -> String {
    let client = match &report.client_id {
        Some(id) => format!("{CLIENT_ID_KEY}={id}"),
        None => format!("# {CLIENT_ID_KEY} is assigned when the application is created"),
    };
    format!("{TENANT_ID_KEY}={}\n{client}", report.tenant_id)
}

/// Human-readable recap of the inputs and derived values.
pub fn render_recap(report: &Report) -> String {
    let settings = &report.settings;
    let mut builder = Builder::default();
    builder.push_record(["Setting", "Value"]);
    builder.push_record(["Application name", settings.app_name.as_str()]);
    builder.push_record(["FQDN", settings.fqdn.as_str()]);
    builder.push_record(["Scheme", settings.scheme.as_str()]);
    builder.push_record(["Redirect URI", report.redirect_uri.as_str()]);
    builder.push_record([
        "Application ID URI",
        report.identifier_uri.as_deref().unwrap_or("-"),
    ]);
    builder.push_record(["Scope", SCOPE_NAME]);
    builder.push_record(["Scope description", settings.scope_description.as_str()]);
    builder.push_record(["Object ID", report.object_id.as_deref().unwrap_or("-")]);
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn report(client_id: Option<&str>) -> Report {
        Report {
            settings: Settings::default(),
            client_id: client_id.map(str::to_string),
            object_id: None,
            tenant_id: "tenant-1".to_string(),
            redirect_uri: "https://localhost".to_string(),
            identifier_uri: client_id.map(Settings::identifier_uri),
            dry_run: false,
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_render_env() {
        assert_eq!(
            render_env(&report(Some("client-1"))),
            "ENTRA_TENANT_ID=tenant-1\nENTRA_CLIENT_ID=client-1"
        );
    }

    #[test]
    fn test_render_env_without_client_id_is_commented() {
        let rendered = render_env(&report(None));
        assert!(rendered.starts_with("ENTRA_TENANT_ID=tenant-1\n# ENTRA_CLIENT_ID"));
        assert!(!rendered.contains("ENTRA_CLIENT_ID="));
    }

    #[test]
    fn test_recap_lists_inputs() {
        let recap = render_recap(&report(Some("client-1")));
        assert!(recap.contains("Diagram Editor"));
        assert!(recap.contains("https://localhost"));
        assert!(recap.contains("api://client-1"));
        assert!(recap.contains("user_impersonation"));
    }
}
