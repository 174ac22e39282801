use std::path::PathBuf;

use clap::Parser;
use reqwest::Url;

mod catalog;
mod error;
mod export;
mod run;
mod state;
mod storage;
mod sync;
mod worker;

use state::data::IdentityPolicy;
use storage::snapshot::SnapshotTarget;

/// Mirror a remote game-map catalog into a local replica and a static
/// JSON + asset export, resumably.
#[derive(Parser, Debug)]
#[command(author, version, about = "Resumable static exporter for game-map catalogs", long_about = None)]
struct Cli {
    /// Remote catalog base URI (e.g. https://maps.example.com/api)
    #[arg(long)]
    source: String,

    /// Where the mirror lands: a local directory or an http(s) WebDAV
    /// URL (credentials in the URL userinfo)
    #[arg(long)]
    target: String,

    /// Resume from the snapshot stored at the target, if one exists
    #[arg(long)]
    resume: bool,

    /// Match entities by business key (name/GUID) instead of keeping
    /// remote ids. Needed when several sources feed one replica.
    #[arg(long)]
    business_key: bool,

    /// Local working directory for the replica database and the asset
    /// cache (defaults to the user data directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn default_work_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .expect("Could not determine user data directory");
    path.push("map-mirror");
    path
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let source = match Url::parse(&cli.source) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("❌ Invalid --source '{}': {e}", cli.source);
            std::process::exit(2);
        }
    };
    let target = match SnapshotTarget::parse(&cli.target) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("❌ Invalid --target: {e}");
            std::process::exit(2);
        }
    };

    let options = run::RunOptions {
        source,
        target,
        resume: cli.resume,
        policy: if cli.business_key {
            IdentityPolicy::BusinessKey
        } else {
            IdentityPolicy::KeepId
        },
        work_dir: cli.work_dir.unwrap_or_else(default_work_dir),
    };

    println!("🗺️  map-mirror v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run::run(options).await {
        eprintln!("❌ Mirror run failed: {e}");
        std::process::exit(1);
    }
}
