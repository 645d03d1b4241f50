pub mod worker;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use recall_service::RecallService;
use recall_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = recall_cli::VERSION,
	rename_all = "kebab",
	styles = recall_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = recall_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	qdrant.ensure_collection().await?;

	tracing::info!(collection = %qdrant.collection, "Indexing worker started.");

	let state = worker::WorkerState { service: RecallService::new(config, db, qdrant) };

	worker::run_worker(state).await
}
