use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;

use biome_ai::{BiomePipeline, GroqClient, groq};
use biome_server::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    let api_key = std::env::var("GROQ_API_KEY")
        .map_err(|_| "GROQ_API_KEY environment variable is required")?;
    let api_url =
        std::env::var("GROQ_API_URL").unwrap_or_else(|_| groq::DEFAULT_API_URL.to_string());
    let model = std::env::var("GROQ_MODEL").unwrap_or_else(|_| groq::DEFAULT_MODEL.to_string());

    let client = GroqClient::new(api_key, api_url, model)?;
    let pipeline = BiomePipeline::new(client, config.pipeline.clone());

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(%address, "biomegen server listening");
    axum::serve(listener, biome_server::app(pipeline)).await?;
    Ok(())
}
