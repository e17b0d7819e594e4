use clap::{Parser, ValueEnum};

use entra_register::az::{DEFAULT_AZ, GRAPH_BASE_URL};
use entra_register::output::OutputFormat;

#[derive(Parser)]
#[command(name = "entra-register")]
#[command(about = "Register and configure an Entra ID application for single-page sign-in")]
#[command(version)]
pub struct Cli {
    /// Application display name
    #[arg(short = 'n', long, env = "ENTRA_APP_NAME")]
    pub app_name: Option<String>,

    /// Host name the application is served from (e.g. draw.example.com)
    #[arg(long, env = "ENTRA_FQDN")]
    pub fqdn: Option<String>,

    /// URL scheme of the redirect URI (http or https)
    #[arg(long, env = "ENTRA_SCHEME")]
    pub scheme: Option<String>,

    /// Consent text shown for the user_impersonation scope
    #[arg(long, env = "ENTRA_SCOPE_DESCRIPTION")]
    pub scope_description: Option<String>,

    /// How to reach the directory
    #[arg(long, value_enum, env = "ENTRA_BACKEND", default_value = "az")]
    pub backend: Backend,

    /// Azure CLI executable
    #[arg(long, env = "AZ_PATH", default_value = DEFAULT_AZ)]
    pub az_path: String,

    /// Microsoft Graph base URL
    #[arg(long, env = "GRAPH_URL", default_value = GRAPH_BASE_URL)]
    pub graph_url: String,

    /// Graph bearer token (graph backend; defaults to one issued by az)
    #[arg(long, env = "GRAPH_ACCESS_TOKEN", hide_env_values = true)]
    pub graph_token: Option<String>,

    /// Show what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "env")]
    pub format: OutputFormat,

    /// Log every call made to the directory
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum Backend {
    /// Azure CLI (`az`), using its signed-in session
    #[default]
    Az,
    /// Microsoft Graph REST API
    Graph,
}
