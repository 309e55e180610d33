use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transaction_insights_agent::{agent::create_agent, api::start_server, config::AgentConfig};

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;
    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set, answers and questions will use templates");
    }

    info!(port = config.port, "Transaction Insights Agent - API Server");

    let agent = Arc::new(create_agent(&config)?);

    // Drop idle sessions in the background
    let evicting = agent.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = evicting.evict_expired(chrono::Utc::now()).await {
                warn!(error = %e, "Session eviction failed");
            }
        }
    });

    start_server(agent, config.port).await?;

    Ok(())
}
