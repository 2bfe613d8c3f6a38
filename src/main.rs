use athletrack_avatars::{
    config::Config,
    error::{AvatarError, Result},
    types::UpdatedAt,
};
use clap::{Parser, Subcommand};

/// Resolve AthleTrack avatar references to signed URLs.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Validity of issued URLs in seconds (defaults to AVATAR_TTL_SECONDS)
    #[arg(long, global = true)]
    ttl: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign a single avatar path
    Sign { path: String },
    /// Sign a path and stamp it with its last update time
    Versioned {
        path: String,
        /// ISO-8601 timestamp or epoch seconds/milliseconds
        #[arg(long)]
        updated_at: Option<String>,
    },
    /// Sign avatars for the given user ids and print them as JSON
    Users {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Sign avatars for every profile and print them as JSON
    All,
}

fn parse_updated_at(raw: String) -> UpdatedAt {
    match raw.trim().parse::<f64>() {
        Ok(epoch) => UpdatedAt::Epoch(epoch),
        Err(_) => UpdatedAt::Iso(raw),
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::from_env()?;
    let ttl = args.ttl.unwrap_or(config.ttl_seconds);
    let avatars = athletrack_avatars::build_service(&config).await?;

    match args.command {
        Command::Sign { path } => {
            let url = avatars.get_signed_avatar(&path, ttl).await;
            if url.is_empty() {
                return Err(AvatarError::NoAvatar(path));
            }
            println!("{url}");
        }
        Command::Versioned { path, updated_at } => {
            let updated_at = updated_at.map(parse_updated_at);
            let url = avatars
                .get_versioned_avatar_src(Some(path.as_str()), updated_at.as_ref(), ttl)
                .await;
            let Some(url) = url else {
                return Err(AvatarError::NoAvatar(path));
            };
            println!("{url}");
        }
        Command::Users { ids } => {
            let urls = avatars.bulk_signed_by_user_ids(&ids, ttl).await;
            log::info!("Resolved {} of {} avatars", urls.len(), ids.len());
            println!("{}", serde_json::to_string_pretty(&urls)?);
        }
        Command::All => {
            let urls = avatars.bulk_signed_all_users(ttl).await;
            println!("{}", serde_json::to_string_pretty(&urls)?);
        }
    }

    log::debug!("{}", avatars.cache_stats().await);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("athletrack_avatars=info"),
    )
    .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("Avatar resolution failed: {e}");
            Err(e)
        }
    }
}
