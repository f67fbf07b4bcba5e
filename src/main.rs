use std::sync::Arc;

use order_bots::bots::BotPool;
use order_bots::cli;
use order_bots::config::{EngineConfig, ServerConfig};
use order_bots::error::Result;
use order_bots::orders::OrderRegistry;
use order_bots::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let engine_config = EngineConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    eprintln!("🤖 Order Bots v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Tick: {:?} (normal bot {} ticks, VIP bot {} ticks)",
        engine_config.tick, engine_config.normal_bot_ticks, engine_config.vip_bot_ticks
    );

    let registry = OrderRegistry::with_capacity(engine_config.event_capacity);
    let pool = Arc::new(BotPool::new(registry, engine_config)?);

    if server_config.enabled {
        let port = server_config.port;
        eprintln!("   Events WS: ws://0.0.0.0:{}/ws", port);
        eprintln!("   API: http://0.0.0.0:{}/api/orders, /api/bots", port);
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            if let Err(e) = server::serve(port, pool).await {
                tracing::error!(error = %e, "Observer server stopped");
            }
        });
    } else {
        eprintln!("   HTTP: disabled");
    }
    eprintln!("   Type 'help' for commands.\n");

    cli::run_repl(&pool).await?;

    pool.shutdown();
    println!("{}", cli::render_status(&pool));
    Ok(())
}
