mod cli;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use cli::{Backend, Cli};
use entra_register::az::AzCli;
use entra_register::graph::GraphClient;
use entra_register::output::{print_error, print_progress, print_summary};
use entra_register::{Directory, ReconcileError, Reconciler, Settings, logging};

#[tokio::main]
async fn main() {
    // Optional .env in the working directory feeds the ENTRA_* defaults
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        let code = e
            .downcast_ref::<ReconcileError>()
            .map_or(1, ReconcileError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::resolve(
        cli.app_name.as_deref(),
        cli.fqdn.as_deref(),
        cli.scheme.as_deref(),
        cli.scope_description.as_deref(),
    );
    let directory = make_directory(&cli).await?;

    eprintln!(
        "Reconciling {} for {}{}",
        settings.app_name.cyan(),
        settings.redirect_uri().cyan(),
        if cli.dry_run { " (dry run)" } else { "" }
    );

    let report = Reconciler::new(directory.as_ref(), &settings)
        .dry_run(cli.dry_run)
        .on_progress(print_progress)
        .run()
        .await?;

    print_summary(&report, cli.format)
}

async fn make_directory(cli: &Cli) -> Result<Box<dyn Directory>> {
    let az = AzCli::new(&cli.az_path).with_graph_url(&cli.graph_url);
    match cli.backend {
        Backend::Az => Ok(Box::new(az)),
        Backend::Graph => {
            let token = match cli.graph_token.as_deref().filter(|t| !t.is_empty()) {
                Some(token) => token.to_string(),
                None => {
                    az.preflight().await?;
                    az.graph_access_token().await?
                }
            };
            Ok(Box::new(GraphClient::new(&cli.graph_url, token)))
        }
    }
}
