use branch_lifetime::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "branch_lifetime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if config.tracked_repositories.is_empty() {
        tracing::warn!("TRACKED_REPOSITORIES is empty, nothing to collect");
    }

    if let Err(e) = branch_lifetime::run(config).await {
        tracing::error!("Collection run failed: {:#}", e);
        std::process::exit(1);
    }
}
