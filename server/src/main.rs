use clap::Parser;
use log::{error, info};
use server::game::World;
use server::network::{Server, ServerMessage};
use shared::GameConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// Maximum number of connected clients
    #[clap(short, long, default_value = "64")]
    max_clients: usize,
    /// Side length of the square world
    #[clap(short, long, default_value = "4000")]
    world_size: f32,
    /// Number of food particles kept in the world
    #[clap(short, long, default_value = "800")]
    food: usize,
    /// Seed for a reproducible world
    #[clap(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = GameConfig {
        world_size: args.world_size,
        tick_rate: args.tick_rate.max(1),
        target_food: args.food,
        max_food: args.food * 2,
        ..GameConfig::default()
    };
    config.validate()?;

    let world = match args.seed {
        Some(seed) => {
            info!("Using world seed {}", seed);
            World::with_seed(config, seed)
        }
        None => World::new(config),
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, world, args.max_clients).await?;

    // Stop between ticks so a tick in progress always completes
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                if shutdown.send(ServerMessage::Shutdown).is_err() {
                    error!("Server loop already stopped");
                }
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await
}
