//! Checks that recorded audio is being uploaded to the object store
//!
//! Usage: `scribe-storage-probe [SESSION_UID]`

use clap::Parser;
use scribe_storage_probe::config::{parse_secure, ProbeConfig, DEFAULT_BUCKET};
use scribe_storage_probe::{probe, ProbeError, S3ObjectStore};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "scribe-storage-probe")]
#[command(about = "Check whether session audio reached the object store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Only report objects whose key contains this session uid
    session_uid: Option<String>,

    #[arg(long, env = "MINIO_HOST")]
    host: Option<String>,

    #[arg(long, env = "MINIO_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    #[arg(long, env = "MINIO_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    #[arg(long, env = "MINIO_BUCKET_NAME", default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// "true" (any case) selects https
    #[arg(long, env = "MINIO_SECURE", default_value = "True")]
    secure: String,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("❌ Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match ProbeConfig::new(
        cli.host,
        cli.access_key,
        cli.secret_key,
        Some(cli.bucket),
        parse_secure(&cli.secure),
    ) {
        Ok(config) => config,
        Err(ProbeError::IncompleteConfig {
            host,
            access_key,
            secret_key,
        }) => {
            println!("❌ MinIO configuration incomplete!");
            println!("   MINIO_HOST: {}", host);
            println!("   MINIO_ACCESS_KEY: {}", access_key);
            println!("   MINIO_SECRET_KEY: {}", secret_key);
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    println!("🔍 Connecting to MinIO: {}", config.host);
    println!("   Bucket: {}", config.bucket);
    println!("   Secure: {}\n", config.secure);

    let store = S3ObjectStore::new(&config);
    let report = probe(&store, &config.bucket, cli.session_uid.as_deref()).await?;
    for line in &report.lines {
        println!("{}", line);
    }

    if !report.bucket_exists {
        process::exit(1);
    }
    Ok(())
}
