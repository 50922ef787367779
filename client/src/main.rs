use clap::Parser;
use client::input::InputPattern;
use client::network::{Client, LinkConditions};
use log::info;
use shared::{PredictionConfig, StunRecovery};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Probability of dropping each packet, in [0, 1]
    #[arg(long, default_value = "0")]
    packet_loss: f64,

    /// Scripted movement to send
    #[arg(short = 'p', long, value_enum, default_value = "circle")]
    pattern: InputPattern,

    /// Stop after this many seconds (runs until Ctrl+C when omitted)
    #[arg(short = 'd', long)]
    duration: Option<u64>,

    /// Disable client-side prediction
    #[arg(long)]
    no_prediction: bool,

    /// Disable input smoothing
    #[arg(long)]
    no_smoothing: bool,

    /// Input smoothing time in seconds
    #[arg(long, default_value = "0.1")]
    smooth_time: f32,

    /// Maximum number of predicted inputs kept for replay
    #[arg(long, default_value = "60")]
    history_size: usize,

    /// Positional error tolerated before a correction
    #[arg(long, default_value = "0.1")]
    threshold: f32,

    /// Simulation rate in Hz, must match the server
    #[arg(long, default_value = "60")]
    tick_rate: u32,

    /// Return to Idle after a stun instead of the previous mode
    #[arg(long)]
    stun_to_idle: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = PredictionConfig {
        enable_prediction: !args.no_prediction,
        max_input_history_size: args.history_size,
        reconciliation_threshold: args.threshold,
        enable_input_smoothing: !args.no_smoothing,
        input_smooth_time: args.smooth_time,
        tick_rate: args.tick_rate,
        stun_recovery: if args.stun_to_idle {
            StunRecovery::Idle
        } else {
            StunRecovery::RestorePrevious
        },
        ..Default::default()
    };
    config.validate()?;

    let link = LinkConditions {
        fake_ping_ms: args.fake_ping,
        packet_loss: args.packet_loss.clamp(0.0, 1.0),
    };

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if link.fake_ping_ms > 0 {
        info!("Simulating {}ms latency", link.fake_ping_ms);
    }
    if link.packet_loss > 0.0 {
        info!("Simulating {:.0}% packet loss", link.packet_loss * 100.0);
    }
    info!(
        "Pattern: {:?}, prediction {}, smoothing {}",
        args.pattern, config.enable_prediction, config.enable_input_smoothing
    );

    let mut client = Client::new(
        &args.server,
        config,
        args.pattern,
        link,
        args.duration.map(Duration::from_secs),
    )
    .await?;

    client.run().await?;

    Ok(())
}
