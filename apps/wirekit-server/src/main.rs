use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use wirekit::{BootstrapOptions, Catalog, RunOptions, ShutdownOptions};
use wirekit_bootstrap::{resolve_env, AppConfig, CliArgs};

use std::path::{Path, PathBuf};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Ensure component crates are linked and registered via inventory
#[allow(dead_code)]
fn _ensure_components_linked() {
    let _ = std::any::type_name::<web_framework::WebFramework>();
    let _ = std::any::type_name::<wirekit_cache::CacheManager>();
}

/// wirekit server - runs every discovered component and framework adapter
#[derive(Parser)]
#[command(name = "wirekit-server")]
#[command(about = "wirekit server - dependency-injected application host")]
#[command(version = "0.1.0")]
struct Cli {
    /// Directory holding config.default.yaml and config.{env}.yaml
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Configuration environment (falls back to WIREKIT_ENV, then prod)
    #[arg(short, long)]
    env: Option<String>,

    /// Print effective configuration (YAML) and exit
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
    /// Validate configuration and component metadata, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    _ensure_components_linked();

    let cli = Cli::parse();
    let args = CliArgs {
        config_dir: cli
            .config_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
        env: cli.env.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };
    let env = resolve_env(args.env.as_deref());

    // defaults -> config.default.yaml -> config.{env}.yaml -> WIREKIT__* -> CLI
    let (mut config, tree) = AppConfig::load_layered(cli.config_dir.as_deref(), &env)?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    wirekit_bootstrap::logging::init_logging_unified(&logging_config, &config.base_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    tracing::info!(app = %config.app.name, env = %env, "wirekit server starting");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config, tree, env).await,
        Commands::Check => check(cli.config_dir.as_deref(), &env).map(|report| println!("{report}")),
    }
}

async fn run_server(config: AppConfig, tree: serde_json::Value, env: String) -> Result<()> {
    let catalog = Catalog::discover();
    tracing::info!(components = catalog.classes().len(), "components discovered");

    let bootstrap = BootstrapOptions::from_tree(tree, config.base_dir(), env)?;
    wirekit::run(RunOptions {
        catalog,
        bootstrap,
        shutdown: ShutdownOptions::Signals,
    })
    .await
}

/// Load configuration and validate every discovered component definition.
fn check(config_dir: Option<&Path>, env: &str) -> Result<String> {
    tracing::info!("Checking configuration…");
    let (config, tree) = AppConfig::load_layered(config_dir, env)?;

    let catalog = Catalog::discover();
    catalog.validate()?;
    let mut ids: Vec<String> = catalog
        .definitions()?
        .iter()
        .map(|d| d.id.to_string())
        .collect();
    ids.sort();

    Ok(format!(
        "Configuration is valid ({} components: {})\n{}\n{}",
        ids.len(),
        ids.join(", "),
        config.to_yaml()?,
        serde_json::to_string_pretty(&tree)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cli_defaults_to_run() {
        let cli = Cli::parse_from(["wirekit-server", "-vv", "--env", "dev"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.env.as_deref(), Some("dev"));
    }

    #[test]
    fn check_reports_the_layered_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.default.yaml"),
            "web:\n  port: 7100\ncache:\n  store: memory\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("config.check.yaml"), "web:\n  prefix: /api\n").unwrap();

        let report = check(Some(dir.path()), "check").unwrap();
        assert!(report.starts_with("Configuration is valid"));
        assert!(report.contains("/api"));
        assert!(report.contains("7100"));
    }
}
