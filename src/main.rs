use clap::Parser;
use runway_store_lib::{ingest_file, IngestConfig, DEFAULT_NAMESPACE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runway-store", about = "Load a funding runway JSON report into SQLite.")]
struct Cli {
    /// Path to the JSON report written by funding-runway
    #[arg(long)]
    json: PathBuf,
    /// Schema (attached database) holding the runway tables
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    schema: String,
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = IngestConfig::new(cli.database_url.as_deref(), &cli.schema)?;
    let id = ingest_file(&config, &cli.json)?;

    println!("Inserted snapshot {id} into schema {}.", config.namespace);
    Ok(())
}
