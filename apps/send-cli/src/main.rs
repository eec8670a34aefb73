use ns_sender::{
	Completion, ConverterRegistry, NodeSnapshot, RunState, SendEnvironment, SendInputs, SendNode,
	SenderConfig, TransportInput, CONFIG_FILE_NAME,
};
use ns_transport::{HttpRemote, LocalCache, StaticAccounts};

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SOURCE_APPLICATION: &str = "ns-send";

#[derive(Parser, Debug)]
#[command(name = "ns-send", about = "Send a JSON payload to one or more streams")]
struct Cli {
	/// JSON file holding the payload to send
	payload: PathBuf,

	/// Stream url to send to, `<server>/streams/<stream id>`
	#[arg(long = "stream", required = true)]
	streams: Vec<String>,

	/// Branch to commit on
	#[arg(long)]
	branch: Option<String>,

	/// Commit message
	#[arg(long, short)]
	message: Option<String>,

	/// Sender config file, created with defaults when missing
	#[arg(long, default_value = CONFIG_FILE_NAME)]
	config: PathBuf,

	/// JSON file with the accounts, `[{ "serverUrl": ..., "token": ... }]`
	#[arg(long)]
	accounts: PathBuf,

	/// Node state file, lets new commits chain to the ones of previous sends
	#[arg(long)]
	state: Option<PathBuf>,

	/// Conversion profile to use
	#[arg(long)]
	profile: Option<String>,

	/// Skip the local object cache
	#[arg(long)]
	no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = SenderConfig::load_or_create(&cli.config)
		.await
		.context("failed to load sender config")?;

	init_logging(&config.log_filter)?;

	let accounts: StaticAccounts = read_json(&cli.accounts)
		.await
		.context("failed to read accounts")?;
	let payload: Value = read_json(&cli.payload)
		.await
		.context("failed to read payload")?;

	let mut env = SendEnvironment::new(
		Arc::new(accounts),
		Arc::new(HttpRemote::new(SOURCE_APPLICATION)),
	)
	.with_defaults(&config.default_branch, &config.default_message);

	if let Some(cache_dir) = &config.cache_dir {
		env = env.with_cache(Arc::new(LocalCache::open(cache_dir).await?));
	}

	let env = Arc::new(env);
	let registry = Arc::new(ConverterRegistry::default());

	let mut node = match &cli.state {
		Some(path) if fs::try_exists(path).await? => {
			let snapshot = NodeSnapshot::from_json(&fs::read_to_string(path).await?)?;
			let mut node = SendNode::restore(&snapshot, registry);

			// A host solves a freshly loaded node once, replaying what it stored
			if node.needs_replay() {
				let replayed = node.send(SendInputs::default(), &env).await;
				report(&replayed);
			}

			node
		}
		_ => SendNode::new(&config, registry),
	};

	if cli.no_cache {
		node.set_use_default_cache(false);
	}

	if let Some(profile) = &cli.profile {
		node.set_profile(profile)?;
	}

	if !node.auto_send() {
		node.force_trigger();
	}

	let inputs = SendInputs::new(
		payload,
		cli.streams.into_iter().map(TransportInput::Text).collect(),
	)
	.with_branch(cli.branch.unwrap_or_default())
	.with_message(cli.message.unwrap_or_default());

	let completion = node.send(inputs, &env).await;
	report(&completion);

	if let Some(path) = &cli.state {
		fs::write(path, node.snapshot().to_json()?)
			.await
			.with_context(|| format!("failed to save node state to '{}'", path.display()))?;
		debug!(path = %path.display(), "Saved node state");
	}

	if node.state() != RunState::UpToDate {
		bail!("send did not complete, node is {}", node.state());
	}

	if let Some(object_id) = node.object_id() {
		info!(%object_id, "Sent data object");
	}

	for (reference, url) in node.outputs().iter().zip(node.commit_urls()) {
		println!("{reference}\t{url}");
	}

	Ok(())
}

fn init_logging(default_filter: &str) -> Result<()> {
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?)
		.with(fmt::layer().with_target(true).with_writer(std::io::stderr))
		.try_init()?;

	Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
	let bytes = fs::read(path)
		.await
		.with_context(|| format!("failed to read '{}'", path.display()))?;

	serde_json::from_slice(&bytes)
		.with_context(|| format!("invalid JSON in '{}'", path.display()))
}

fn report(completion: &Completion) {
	for entry in &completion.diagnostics {
		eprintln!("{entry}");
	}
}
