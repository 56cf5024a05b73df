/// Flashcard graph service binary
use flashcard_graph::{config::ServerConfig, context::AppContext, error::CardResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> CardResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = config.logging.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Print banner
    print_banner(&config);

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
    flashcard-graph v{}
    cards as vertices, labels as edges
        "#,
        config.service.version
    );
}
