use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zkgm_common::{fr_to_decimal, parse_fr_decimal, FieldValue, Settings};
use zkgm_prover::{
    parse_target, CommandProver, MembershipRequest, ProofPipeline, ProverOutput,
    SubmissionRequest, PROOF_FILE, PUBLIC_FILE,
};
use zkgm_relayer::{PollOutcome, RelayTask};
use zkgm_witness::{Kernel, KernelOptions};

#[derive(Parser)]
#[command(name = "zkgm", about = "Anonymous group-membership proofs")]
struct Cli {
    /// TOML settings file; `ZKGM__SECTION__KEY` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild a group from the membership feed and print its tree.
    Group(GroupArgs),
    /// Download (or find cached) circuit artifacts for a tree depth.
    Artifacts(ArtifactsArgs),
    /// Compute a witness file from a circuit input JSON.
    Witness(WitnessArgs),
    /// Build the witness and run the external prover.
    Prove(ProveArgs),
    /// Relay an existing proof and wait for the outcome.
    Submit(SubmitArgs),
    /// Follow an already submitted relay task.
    Status(StatusArgs),
}

#[derive(Args)]
struct GroupArgs {
    #[arg(long)]
    group_id: u64,
    /// Also print the inclusion proof of this commitment.
    #[arg(long)]
    commitment: Option<String>,
    /// Check the rebuilt root against the membership contract.
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct ArtifactsArgs {
    #[arg(long)]
    depth: u32,
    /// Re-hash cached files against their manifest.
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct WitnessArgs {
    /// Circuit input map (decimal strings, numbers or nested arrays).
    #[arg(long)]
    input: PathBuf,
    /// Circuit binary; defaults to the cached artifact for `--depth`.
    #[arg(long)]
    wasm: Option<PathBuf>,
    #[arg(long, required_unless_present = "wasm")]
    depth: Option<u32>,
    #[arg(long, default_value = "witness.wtns")]
    output: PathBuf,
}

#[derive(Args)]
struct ProveArgs {
    #[arg(long)]
    group_id: u64,
    /// Identity secret scalar.
    #[arg(long, env = "ZKGM_SECRET", hide_env_values = true)]
    secret: String,
    /// Identity commitment as it appears in the group.
    #[arg(long)]
    commitment: String,
    #[arg(long)]
    scope: String,
    #[arg(long)]
    message: String,
    #[arg(long)]
    verify_onchain: bool,
    /// Relay the proof once it is generated.
    #[arg(long)]
    submit: bool,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long)]
    group_id: u64,
    /// Depth of the circuit the proof was generated with.
    #[arg(long)]
    depth: u64,
    #[arg(long)]
    scope: String,
    #[arg(long)]
    message: String,
    #[arg(long)]
    proof: Option<PathBuf>,
    #[arg(long)]
    public: Option<PathBuf>,
    /// Return after the relay accepts the task.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Args)]
struct StatusArgs {
    #[arg(long)]
    task_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = load_cli(None, std::env::args_os());
    init_tracing(cli.json_logs);

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Commands::Group(args) => group(&settings, args).await,
        Commands::Artifacts(args) => artifacts(&settings, args).await,
        Commands::Witness(args) => witness(&settings, args).await,
        Commands::Prove(args) => prove(&settings, args).await,
        Commands::Submit(args) => submit(&settings, args).await,
        Commands::Status(args) => status(&settings, args).await,
    }
}

/// Load `.env` (or `env_file`) before parsing so env-backed flags and
/// `RUST_LOG` can come from it.
fn load_cli<I, T>(env_file: Option<&Path>, args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Cli::parse_from(args)
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "zkgm=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn group(settings: &Settings, args: GroupArgs) -> Result<()> {
    let pipeline = ProofPipeline::from_settings(settings)?;
    let group = pipeline
        .group(args.group_id, args.verify)
        .await
        .with_context(|| format!("failed to rebuild group {}", args.group_id))?;

    println!("group:   {}", group.group_id());
    println!("root:    {}", fr_to_decimal(&group.root()));
    println!("size:    {}", group.size());
    println!("active:  {}", group.active_member_count());
    println!("depth:   {}", group.depth());

    if let Some(raw) = args.commitment {
        let commitment = parse_fr_decimal(&raw).context("invalid commitment")?;
        let proof = group.merkle_proof(&commitment)?;
        println!("{}", serde_json::to_string_pretty(&proof)?);
    }
    Ok(())
}

async fn artifacts(settings: &Settings, args: ArtifactsArgs) -> Result<()> {
    let pipeline = ProofPipeline::from_settings(settings)?;
    let cache = pipeline.artifacts();
    let circuit = pipeline.circuit(args.depth as usize);

    let bundle = cache
        .resolve(&circuit)
        .await
        .with_context(|| format!("failed to resolve artifacts for {}", circuit.file_stem()))?;
    println!("wasm: {}", bundle.circuit_binary.display());
    println!("zkey: {}", bundle.proving_key.display());

    if args.verify {
        let manifest = cache.verify(&circuit).await?;
        println!(
            "verified: wasm {} zkey {}",
            manifest.circuit_binary.blake3, manifest.proving_key.blake3
        );
    }
    Ok(())
}

async fn witness(settings: &Settings, args: WitnessArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let input: serde_json::Value = serde_json::from_str(&raw).context("failed to parse input json")?;

    let wasm = match (args.wasm, args.depth) {
        (Some(path), _) => path,
        (None, Some(depth)) => {
            let pipeline = ProofPipeline::from_settings(settings)?;
            let circuit = pipeline.circuit(depth as usize);
            pipeline.artifacts().resolve(&circuit).await?.circuit_binary
        }
        (None, None) => return Err(anyhow!("either --wasm or --depth is required")),
    };

    let options = KernelOptions {
        sanity_check: settings.witness.sanity_check,
    };
    let output = args.output.clone();
    let len = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut kernel = Kernel::load_file(&wasm, options)
            .with_context(|| format!("failed to load {}", wasm.display()))?;
        let witness = kernel.compute_witness_json(&input)?;
        witness.write_wtns(&output)?;
        Ok(witness.len())
    })
    .await??;

    info!(values = len, "witness written to {}", args.output.display());
    Ok(())
}

async fn prove(settings: &Settings, args: ProveArgs) -> Result<()> {
    let pipeline = ProofPipeline::from_settings(settings)?;
    let request = MembershipRequest {
        group_id: args.group_id,
        secret: parse_fr_decimal(&args.secret).context("invalid secret")?,
        commitment: parse_fr_decimal(&args.commitment).context("invalid commitment")?,
        scope: FieldValue::parse(&args.scope).context("invalid scope")?,
        message: FieldValue::parse(&args.message).context("invalid message")?,
        verify_onchain: args.verify_onchain,
    };

    let prepared = pipeline.prepare(&request).await?;
    let backend = CommandProver::new(settings.prover.command.clone());
    let output = pipeline
        .prove(&prepared, &backend)
        .await
        .context("proof generation failed")?;
    println!("proof:  {}", output.proof_path.display());
    println!("public: {}", output.public_path.display());
    println!("depth:  {}", prepared.merkle_tree_depth());

    if args.submit {
        let submission = SubmissionRequest {
            group_id: args.group_id,
            merkle_tree_depth: prepared.merkle_tree_depth(),
            scope: request.scope,
            message: request.message,
            target: verifier_target(settings)?,
        };
        let task_id = pipeline.submit(&submission, &output).await?;
        follow(&pipeline, &task_id).await?;
    }
    Ok(())
}

async fn submit(settings: &Settings, args: SubmitArgs) -> Result<()> {
    let pipeline = ProofPipeline::from_settings(settings)?;
    let proof_path = args
        .proof
        .unwrap_or_else(|| pipeline.work_dir().join(PROOF_FILE));
    let public_path = args
        .public
        .unwrap_or_else(|| pipeline.work_dir().join(PUBLIC_FILE));
    let output = ProverOutput::read(proof_path, public_path).await?;

    let request = SubmissionRequest {
        group_id: args.group_id,
        merkle_tree_depth: args.depth,
        scope: FieldValue::parse(&args.scope).context("invalid scope")?,
        message: FieldValue::parse(&args.message).context("invalid message")?,
        target: verifier_target(settings)?,
    };
    let task_id = pipeline.submit(&request, &output).await?;
    println!("task: {}", task_id);

    if !args.no_wait {
        follow(&pipeline, &task_id).await?;
    }
    Ok(())
}

async fn status(settings: &Settings, args: StatusArgs) -> Result<()> {
    let pipeline = ProofPipeline::from_settings(settings)?;
    follow(&pipeline, &args.task_id).await
}

fn verifier_target(settings: &Settings) -> Result<ethers::types::Address> {
    let raw = settings
        .chain
        .verifier_contract
        .as_deref()
        .ok_or_else(|| anyhow!("chain.verifier_contract is not configured"))?;
    Ok(parse_target(raw)?)
}

/// Poll until the task settles; Ctrl-C stops polling without failing.
async fn follow(pipeline: &ProofPipeline, task_id: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut last = String::new();
    let outcome = pipeline
        .await_task(task_id, &cancel, |task: &RelayTask| {
            let message = task.status_message();
            if message != last {
                println!("{}", message);
                last = message;
            }
        })
        .await;
    signal.abort();

    match outcome.context("failed to check transaction status")? {
        PollOutcome::Terminal(task) if task.state.is_success() => {
            if let Some(hash) = &task.transaction_hash {
                println!("transaction: {}", hash);
            }
            Ok(())
        }
        PollOutcome::Terminal(task) => Err(anyhow!(
            "task {} ended as {}: {}",
            task.id,
            task.state,
            task.last_message.unwrap_or_default()
        )),
        PollOutcome::Cancelled => {
            warn!("stopped following task {}", task_id);
            Ok(())
        }
    }
}
