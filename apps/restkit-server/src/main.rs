use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use restkit::{ApiRegistry, RequestMiddleware, YamlSerializer};
use runtime::{AppConfig, CliArgs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

mod request_id;
mod server;
mod widgets;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// restkit server - CRUD resources over a uniform REST envelope
#[derive(Parser)]
#[command(name = "restkit-server")]
#[command(about = "restkit server - CRUD resources over a uniform REST envelope")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and resource rules, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // home_dir is normalized inside
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.server.home_dir));
    tracing::info!("restkit server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let api = build_registry(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config, api).await,
        Commands::Check => {
            println!(
                "Configuration OK: {} resource(s), formats {:?}",
                api.resource_names().len(),
                api.available_formats()
            );
            Ok(())
        }
    }
}

/// Register resources and serializers, then fail fast on rule misconfiguration.
fn build_registry(config: &AppConfig) -> Result<ApiRegistry> {
    let api = ApiRegistry::with_config(config.api.clone());
    api.register_response_serializer("yaml", Arc::new(YamlSerializer));

    let widgets_cfg: widgets::WidgetsConfig = config.module_config(widgets::RESOURCE)?;
    api.register_resource_handler(
        widgets::WidgetHandler::new(widgets_cfg),
        [request_id::tag_requests(), timing()],
    );

    api.validate_rules()
        .context("resource rules are misconfigured")?;
    tracing::info!(
        resources = ?api.resource_names(),
        formats = ?api.available_formats(),
        "registry ready"
    );
    Ok(api)
}

fn timing() -> RequestMiddleware {
    restkit::from_fn(|req, next| async move {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let resp = next.call(req).await;
        tracing::debug!(
            %method,
            path,
            status = resp.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "resource call"
        );
        resp
    })
}

async fn run_server(config: AppConfig, api: ApiRegistry) -> Result<()> {
    let app = server::build_app(&api, &config.server);
    server::serve(app, &config.server).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_from_default_config() {
        let api = build_registry(&AppConfig::default()).unwrap();
        assert_eq!(api.resource_names(), vec!["widgets"]);
        assert_eq!(api.available_formats(), vec!["json", "yaml"]);
        assert!(api.route("widgets:readList").is_some());
    }

    #[test]
    fn bad_module_config_is_reported() {
        let mut config = AppConfig::default();
        config
            .modules
            .insert("widgets".into(), serde_json::json!({"unknown": true}));
        assert!(build_registry(&config).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["restkit-server", "-vv", "--port", "9000", "check"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.port, Some(9000));
        assert!(matches!(cli.command, Some(Commands::Check)));
    }
}
