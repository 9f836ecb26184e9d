//! Pledgewall - pledge collection service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pledgewall::{
    config::Args,
    counter::spawn_counter_sync,
    db::MongoClient,
    fallback::{self, LocalPledgeLog},
    server::{self, AppState},
    store::{spawn_count_refresher, InMemoryPledgeStore, MongoPledgeStore, PledgeStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("pledgewall={},info", log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Pledgewall");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db '{}')", args.mongodb_uri, args.mongodb_db);
    info!("Local fallback: {}", args.fallback_path.display());
    info!("Form variant: {}", args.form_variant);
    info!("======================================");

    // MongoDB is required in production; dev mode falls back to memory
    let (store, store_kind): (Arc<dyn PledgeStore>, &'static str) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                let mongo_store = Arc::new(MongoPledgeStore::new(&client).await?);
                spawn_count_refresher(Arc::clone(&mongo_store), args.count_refresh_interval());
                (mongo_store as Arc<dyn PledgeStore>, "mongodb")
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                    (Arc::new(InMemoryPledgeStore::new()) as Arc<dyn PledgeStore>, "memory")
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    let fallback = Arc::new(LocalPledgeLog::new(args.fallback_path.clone()));
    fallback::report(&fallback).await;

    let state = Arc::new(AppState::new(args, Arc::clone(&store), store_kind, Arc::clone(&fallback))?);
    spawn_counter_sync(Arc::clone(&state.counter), store, fallback);

    server::run(state).await?;
    Ok(())
}
