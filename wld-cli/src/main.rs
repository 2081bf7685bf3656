use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wld_reconcile::diff::{ClusterChanges, HostChange};
use wld_reconcile::model::{
    ClusterObservedState, ClusterResource, DomainDesiredState, DomainObservedState,
};
use wld_reconcile::raw::{ClusterResourceConfig, DomainConfig};
use wld_reconcile::{
    CallerAction, ClusterReconciler, DomainReconciler, DomainUpdatePlan, ReconcileContext,
    ReconcileError, Reconciler, ReconcilerConfig, plan_domain_update,
};

mod http;
mod state;

use http::SddcManagerClient;
use state::StateRecord;

#[derive(Parser)]
#[command(name = "wld")]
#[command(about = "Reconcile workload domains and clusters against SDDC Manager")]
struct Cli {
    /// SDDC Manager host name or address
    #[arg(long, env = "WLD_SDDC_HOST")]
    host: Option<String>,

    #[arg(long, env = "WLD_SDDC_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "WLD_SDDC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Accept self-signed certificates
    #[arg(long)]
    allow_unverified_tls: bool,

    /// Abandon polling after this many seconds; remote tasks keep running
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Timeout of a single HTTP call
    #[arg(long, default_value_t = 120)]
    call_timeout_secs: u64,

    #[arg(long)]
    create_timeout_secs: Option<u64>,

    #[arg(long)]
    read_timeout_secs: Option<u64>,

    #[arg(long)]
    update_timeout_secs: Option<u64>,

    #[arg(long)]
    delete_timeout_secs: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ResourceArgs {
    /// Desired state JSON file
    #[arg(long)]
    desired: PathBuf,

    /// State file written after each pass
    #[arg(long)]
    state: PathBuf,
}

#[derive(Args)]
struct StateArgs {
    #[arg(long)]
    state: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workload domain
    Create(ResourceArgs),
    /// Refresh the recorded state of a domain
    Read(StateArgs),
    /// Converge a domain onto the desired state
    Update(ResourceArgs),
    /// Delete a domain
    Delete(StateArgs),
    /// Print what an update would do, without contacting SDDC Manager
    Plan(ResourceArgs),
    /// Create a cluster in an existing domain
    ClusterCreate(ResourceArgs),
    ClusterRead(StateArgs),
    ClusterUpdate(ResourceArgs),
    ClusterDelete(StateArgs),
}

/// Observed state that can be addressed by its remote identifier.
trait Tracked: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
}

impl Tracked for DomainObservedState {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Tracked for ClusterObservedState {
    fn id(&self) -> &str {
        &self.id
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "wld=debug,wld_reconcile=debug,audit=info,reqwest=warn,hyper=warn"
    } else {
        "wld=info,wld_reconcile=info,audit=info,reqwest=warn,hyper=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Plan(args) = &cli.command {
        return plan(args).await;
    }

    let ctx = connect(&cli).await?;
    if let Some(secs) = cli.deadline_secs {
        ctx.cancel_after(Duration::from_secs(secs));
    }
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; remote tasks keep running");
            cancel.cancel();
        }
    });

    let domains = DomainReconciler::new();
    let clusters = ClusterReconciler::new();
    match &cli.command {
        Commands::Create(args) => {
            let desired = load_desired::<DomainConfig, DomainDesiredState>(&args.desired).await?;
            create(&domains, &ctx, &desired, &args.state).await
        }
        Commands::Read(args) => read(&domains, &ctx, &args.state).await,
        Commands::Update(args) => {
            let desired = load_desired::<DomainConfig, DomainDesiredState>(&args.desired).await?;
            update(&domains, &ctx, &desired, &args.state).await
        }
        Commands::Delete(args) => delete(&domains, &ctx, &args.state).await,
        Commands::ClusterCreate(args) => {
            let desired =
                load_desired::<ClusterResourceConfig, ClusterResource>(&args.desired).await?;
            create(&clusters, &ctx, &desired, &args.state).await
        }
        Commands::ClusterRead(args) => read(&clusters, &ctx, &args.state).await,
        Commands::ClusterUpdate(args) => {
            let desired =
                load_desired::<ClusterResourceConfig, ClusterResource>(&args.desired).await?;
            update(&clusters, &ctx, &desired, &args.state).await
        }
        Commands::ClusterDelete(args) => delete(&clusters, &ctx, &args.state).await,
        // Handled before connecting.
        Commands::Plan(_) => Ok(()),
    }
}

fn config(cli: &Cli) -> ReconcilerConfig {
    let mut config = ReconcilerConfig::default();
    let secs = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_secs);
    config.create_timeout = secs(cli.create_timeout_secs, config.create_timeout);
    config.read_timeout = secs(cli.read_timeout_secs, config.read_timeout);
    config.update_timeout = secs(cli.update_timeout_secs, config.update_timeout);
    config.delete_timeout = secs(cli.delete_timeout_secs, config.delete_timeout);
    config
}

async fn connect(cli: &Cli) -> Result<ReconcileContext> {
    let host = cli.host.as_deref().context("--host or WLD_SDDC_HOST is required")?;
    let username = cli
        .username
        .as_deref()
        .context("--username or WLD_SDDC_USERNAME is required")?;
    let password = cli
        .password
        .as_deref()
        .context("--password or WLD_SDDC_PASSWORD is required")?;

    let client = SddcManagerClient::connect(
        host,
        username,
        password,
        cli.allow_unverified_tls,
        Duration::from_secs(cli.call_timeout_secs),
    )
    .await
    .with_context(|| format!("Failed to connect to {}", host))?;
    info!(host = %host, "Connected to SDDC Manager");

    Ok(ReconcileContext::new(Arc::new(client), config(cli)))
}

async fn load_desired<R, T>(path: &Path) -> Result<T>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = ReconcileError>,
{
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: R = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    T::try_from(raw).with_context(|| format!("Invalid desired state in {}", path.display()))
}

async fn load_observed<T: Tracked>(path: &Path) -> Result<T> {
    match state::load::<T>(path).await? {
        Some(StateRecord::Observed { observed }) => Ok(observed),
        Some(StateRecord::PendingCreate { task_id }) => bail!(
            "{} records an unfinished create (task {}); run create again to resume it",
            path.display(),
            task_id
        ),
        None => bail!("No state file at {}; nothing has been created", path.display()),
    }
}

async fn create<R>(reconciler: &R, ctx: &ReconcileContext, desired: &R::Desired, path: &Path) -> Result<()>
where
    R: Reconciler,
    R::Observed: Tracked,
{
    let result = match state::load::<R::Observed>(path).await? {
        Some(StateRecord::Observed { observed }) => bail!(
            "{} already exists according to {}; use update",
            observed.id(),
            path.display()
        ),
        Some(StateRecord::PendingCreate { task_id }) => {
            info!("Resuming create task {}", task_id);
            reconciler.resume_create(ctx, &task_id, desired).await
        }
        None => reconciler.create(ctx, desired).await,
    };
    record_create(result, path).await
}

/// Record the outcome of a create. An unfinished task is kept for the next
/// pass; a task that failed for good leaves nothing to resume.
async fn record_create<T: Tracked>(result: wld_reconcile::Result<T>, path: &Path) -> Result<()> {
    if let Err(err) = &result {
        if err.is_indeterminate()
            && let Some(task_id) = err.task_id()
        {
            warn!("Create task {} did not finish; recording it for the next pass", task_id);
            state::save::<T>(
                path,
                &StateRecord::PendingCreate {
                    task_id: task_id.to_string(),
                },
            )
            .await?;
        } else if matches!(
            err,
            ReconcileError::TaskFailed { fatal: true, .. }
                | ReconcileError::TaskResourceMissing { .. }
        ) {
            warn!("Create did not produce a resource; dropping the pending record");
            state::remove(path).await?;
        }
    }
    finish(result, path).await
}

/// Re-read the resource against the state it was last applied with.
async fn read<R>(reconciler: &R, ctx: &ReconcileContext, path: &Path) -> Result<()>
where
    R: Reconciler,
    R::Observed: Tracked,
{
    let prior = load_observed::<R::Observed>(path).await?;
    finish(reconciler.refresh(ctx, &prior).await, path).await
}

async fn update<R>(reconciler: &R, ctx: &ReconcileContext, desired: &R::Desired, path: &Path) -> Result<()>
where
    R: Reconciler,
    R::Observed: Tracked,
{
    let prior = load_observed::<R::Observed>(path).await?;
    finish(reconciler.update(ctx, &prior, desired).await, path).await
}

async fn delete<R>(reconciler: &R, ctx: &ReconcileContext, path: &Path) -> Result<()>
where
    R: Reconciler,
    R::Observed: Tracked,
{
    let prior = load_observed::<R::Observed>(path).await?;
    match reconciler.delete(ctx, &prior).await {
        Ok(()) => state::remove(path).await,
        Err(err) => fail(err, path).await,
    }
}

/// Record and print the outcome of a pass that returns observed state.
async fn finish<T: Tracked>(result: wld_reconcile::Result<T>, path: &Path) -> Result<()> {
    match result {
        Ok(observed) => {
            state::save(path, &StateRecord::Observed { observed: &observed }).await?;
            println!("{}", serde_json::to_string_pretty(&observed)?);
            Ok(())
        }
        Err(err) => fail(err, path).await,
    }
}

async fn fail(err: ReconcileError, path: &Path) -> Result<()> {
    let hint = match err.caller_action() {
        CallerAction::DropRecord => {
            warn!("{}; dropping the record", err);
            return state::remove(path).await;
        }
        CallerAction::FixInput => "fix the desired state and run again",
        CallerAction::Retry => "the call can be retried as is",
        CallerAction::Reread => "the outcome is unknown; read the resource before changing it",
        CallerAction::Surface => "SDDC Manager rejected the change",
    };
    Err(anyhow::Error::new(err).context(hint))
}

async fn plan(args: &ResourceArgs) -> Result<()> {
    let desired = load_desired::<DomainConfig, DomainDesiredState>(&args.desired).await?;
    let prior = load_observed::<DomainObservedState>(&args.state).await?;
    let plan = plan_domain_update(&prior.applied(), &desired, false)
        .context("The desired state cannot be reached by an update")?;
    print_plan(&plan);
    Ok(())
}

fn print_plan(plan: &DomainUpdatePlan) {
    if plan.is_empty() {
        println!("No changes.");
        return;
    }
    if let Some(name) = &plan.rename {
        println!("~ rename domain to '{}'", name);
    }
    match &plan.clusters {
        ClusterChanges::Unchanged => {}
        ClusterChanges::Membership { added, removed } => {
            for cluster in added {
                println!("+ cluster '{}' ({} hosts)", cluster.name, cluster.hosts.len());
            }
            for cluster in removed {
                println!(
                    "- cluster '{}' ({})",
                    cluster.name,
                    cluster.id.as_deref().unwrap_or("unknown id")
                );
            }
        }
        ClusterChanges::InPlace(updates) => {
            for update in updates {
                let hosts = |hosts: &[wld_reconcile::model::HostMembership]| {
                    hosts
                        .iter()
                        .map(|h| h.host_id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let change = match &update.change {
                    HostChange::NoChange => continue,
                    HostChange::Expand(added) => format!("+[{}]", hosts(added)),
                    HostChange::Contract(removed) => format!("-[{}]", hosts(removed)),
                    HostChange::ExpandAndContract { added, removed } => {
                        format!("+[{}] -[{}]", hosts(added), hosts(removed))
                    }
                };
                println!("~ cluster '{}' hosts {}", update.cluster_name, change);
            }
        }
    }
}
