use clap::Parser;
use log::info;
use server::network::{GameplaySchedule, Server, ServerOptions};
use shared::{MovementSettings, StunRecovery};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation rate in Hz, must match the clients
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Base movement speed in units per second
    #[arg(long, default_value = "5.0")]
    speed: f32,

    /// Maximum turn rate in radians per second
    #[arg(long, default_value = "10.0")]
    rotation_speed: f32,

    /// Speed multiplier while carrying
    #[arg(long, default_value = "0.7")]
    carry_multiplier: f32,

    /// Stun every player every N ticks
    #[arg(long)]
    stun_every: Option<u32>,

    /// Stun duration in seconds
    #[arg(long, default_value = "1.0")]
    stun_duration: f32,

    /// Toggle carrying on every player every N ticks
    #[arg(long)]
    carry_every: Option<u32>,

    /// Return to Idle after a stun instead of the previous mode
    #[arg(long)]
    stun_to_idle: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let options = ServerOptions {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        settings: MovementSettings {
            base_movement_speed: args.speed,
            rotation_speed: args.rotation_speed,
            carrying_speed_multiplier: args.carry_multiplier,
            ..Default::default()
        },
        stun_recovery: if args.stun_to_idle {
            StunRecovery::Idle
        } else {
            StunRecovery::RestorePrevious
        },
        schedule: GameplaySchedule {
            stun_every: args.stun_every,
            stun_duration: args.stun_duration,
            carry_every: args.carry_every,
        },
    };

    let addr = format!("{}:{}", args.host, args.port);
    info!("Starting server on {} at {}Hz", addr, args.tick_rate);

    let mut server = Server::new(&addr, options).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            let _ = shutdown.send(server::network::ServerMessage::Shutdown);
        }
    });

    server.run().await?;

    Ok(())
}
