use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use appsuite_operator::config::CoreConfig;
use appsuite_operator::crd::AppSuite;
use appsuite_operator::reconcile::Reconciler;
use appsuite_operator::resolver::{Environment, StaticResolver};
use appsuite_operator::resources::ResourceKind;
use appsuite_operator::store::MemoryStore;
use appsuite_operator::Error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the AppSuite CRD manifest
    Crd,
    /// Dry-run reconciliation against an in-memory cluster
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Path to the AppSuite CR manifest (YAML)
    #[arg(long)]
    app: PathBuf,

    /// Path to the pre-rendered environment description (YAML)
    #[arg(long)]
    environment: PathBuf,

    /// Domain used for synthetic route hostname assignment
    #[arg(long, env = "SIMULATE_DOMAIN", default_value = "apps.example.com")]
    domain: String,

    /// Maximum number of passes before giving up on convergence
    #[arg(long, default_value_t = 5)]
    max_passes: u32,

    /// Keystore password used when the CR does not configure one
    #[arg(long, env = "KEYSTORE_PASSWORD", default_value = "changeit")]
    keystore_password: String,

    /// Registry used when neither the CR nor an image rule picks one
    #[arg(long, env = "DEFAULT_REGISTRY")]
    default_registry: Option<String>,

    /// Mark created image tags for insecure registry access
    #[arg(long, env = "INSECURE_REGISTRY")]
    insecure_registry: bool,

    /// Platform version gating cosmetic console links, e.g. "4.12.0"
    #[arg(long, env = "PLATFORM_VERSION")]
    platform_version: Option<semver::Version>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into())),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Crd => {
            let crd = serde_yaml::to_string(&AppSuite::crd())
                .map_err(|e| Error::Configuration(e.to_string()))?;
            print!("{crd}");
            Ok(())
        }
        Commands::Simulate(simulate_args) => run_simulation(simulate_args).await,
    }
}

/// Run reconcile passes against a [`MemoryStore`], playing the platform's
/// part by assigning hostnames to the routes each pass creates.
async fn run_simulation(args: SimulateArgs) -> Result<(), Error> {
    let app: AppSuite = read_yaml(&args.app)?;
    let environment: Environment = read_yaml(&args.environment)?;

    let namespace = app.metadata.namespace.clone().unwrap_or_default();
    let name = app.metadata.name.clone().unwrap_or_default();

    let store = Arc::new(MemoryStore::new());
    store.put_app(app).await;
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(StaticResolver::new(environment)),
        CoreConfig {
            default_registry: args
                .default_registry
                .clone()
                .unwrap_or_else(|| CoreConfig::default().default_registry),
            insecure_registry: args.insecure_registry,
            keystore_password: args.keystore_password.clone(),
            platform_version: args.platform_version.clone(),
        },
    );

    for pass in 1..=args.max_passes {
        let outcome = reconciler.reconcile(&namespace, &name).await?;
        info!(
            pass,
            has_changes = outcome.has_changes,
            requeue_after = ?outcome.requeue_after,
            "pass finished"
        );

        for route in store.all_of_kind(ResourceKind::Route).await {
            store
                .assign_route_host(
                    &route.namespace(),
                    &route.name(),
                    &format!("{}.{}", route.name(), args.domain),
                )
                .await;
        }

        if !outcome.has_changes && outcome.requeue_after.is_none() {
            break;
        }
    }

    if let Some(status) = store.app_status().await {
        let rendered =
            serde_yaml::to_string(&status).map_err(|e| Error::Configuration(e.to_string()))?;
        print!("{rendered}");
    }
    Ok(())
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, Error> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&raw).map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
}
