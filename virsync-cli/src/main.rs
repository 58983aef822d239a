use anyhow::Context;
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use virsync_client::resources::{VirDomain, VmState};
use virsync_client::{ClusterApi, ClusterConfig, HttpClient, TaskWaitOptions, endpoints};
use virsync_core::{DesiredDocument, Outcome, ReconcileOptions, reconcile_document};

#[derive(Parser)]
#[command(name = "virsync")]
#[command(about = "Declarative VM resource reconciliation for HyperCore-style clusters", long_about = None)]
struct Cli {
    /// Cluster API base URL, e.g. https://cluster.example.com
    #[arg(long, env = "VIRSYNC_HOST")]
    host: String,

    /// API username
    #[arg(long, env = "VIRSYNC_USERNAME")]
    username: String,

    /// API password
    #[arg(long, env = "VIRSYNC_PASSWORD", hide_env_values = true)]
    password: String,

    /// Accept self-signed cluster certificates
    #[arg(long, env = "VIRSYNC_INSECURE")]
    insecure: bool,

    /// Maximum seconds to wait for one cluster task
    #[arg(long, default_value = "300")]
    task_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a desired-state document (JSON file, or '-' for stdin)
    Apply {
        /// Path to the document
        file: String,
    },

    /// VM inventory
    #[command(subcommand)]
    Vm(VmCommands),
}

#[derive(Subcommand)]
enum VmCommands {
    /// List all VMs
    List,

    /// Show one VM as JSON
    Get {
        /// VM name
        name: String,
    },
}

#[derive(Tabled)]
struct VmRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "VCPUS")]
    vcpus: u32,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "UUID")]
    uuid: String,
}

impl From<VirDomain> for VmRow {
    fn from(vm: VirDomain) -> Self {
        Self {
            name: vm.name,
            state: format_state(vm.state),
            vcpus: vm.num_vcpu,
            memory: format!("{}MB", vm.mem / (1024 * 1024)),
            uuid: vm.uuid,
        }
    }
}

fn format_state(state: VmState) -> String {
    match state {
        VmState::Running => "running".to_string(),
        VmState::Blocked => "blocked".to_string(),
        VmState::Paused => "paused".to_string(),
        VmState::Shutdown => "shutting down".to_string(),
        VmState::Shutoff => "stopped".to_string(),
        VmState::Crashed => "crashed".to_string(),
    }
}

async fn read_document(file: &str) -> anyhow::Result<DesiredDocument> {
    let raw = if file == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading document from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading document {}", file))?
    };
    serde_json::from_str(&raw).context("parsing desired-state document")
}

async fn run_apply(client: &HttpClient, opts: &ReconcileOptions, file: &str) -> anyhow::Result<bool> {
    let document = read_document(file).await?;
    debug!(file = %file, "Applying desired-state document");

    let outcome = match reconcile_document(client, document, opts).await {
        Ok(outcome) => outcome,
        // Pre-execution errors (validation, missing resources) become a
        // failed outcome with no applied operations.
        Err(e) => Outcome::failure(None, &[], e),
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(!outcome.failed)
}

async fn run_vm_list(client: &HttpClient) -> anyhow::Result<()> {
    let records = client.list(endpoints::VIR_DOMAIN, &[]).await?;
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let vm: VirDomain = serde_json::from_value(record)?;
        rows.push(VmRow::from(vm));
    }
    println!("{}", Table::new(rows));
    Ok(())
}

async fn run_vm_get(client: &HttpClient, name: &str) -> anyhow::Result<()> {
    let records = client
        .list(endpoints::VIR_DOMAIN, &[("name", name.to_string())])
        .await?;
    let record = records
        .into_iter()
        .find(|r| r["name"] == name)
        .with_context(|| format!("VM {} not found", name))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let client = HttpClient::new(ClusterConfig {
        host: cli.host,
        username: cli.username,
        password: cli.password,
        accept_invalid_certs: cli.insecure,
    })?;
    let opts = ReconcileOptions {
        task_wait: TaskWaitOptions {
            timeout: std::time::Duration::from_secs(cli.task_timeout),
            ..Default::default()
        },
    };

    match cli.command {
        Commands::Apply { file } => {
            if !run_apply(&client, &opts, &file).await? {
                std::process::exit(1);
            }
        }
        Commands::Vm(VmCommands::List) => run_vm_list(&client).await?,
        Commands::Vm(VmCommands::Get { name }) => run_vm_get(&client, &name).await?,
    }

    Ok(())
}
