mod config;
mod server;

use anyhow::Result;
use clap::Parser;

use netpose::LinkSpec;

use config::RelayConfig;
use server::RelayServer;

#[derive(Parser)]
#[command(name = "netpose-relay")]
#[command(about = "Transform-frame relay server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = netpose::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 64)]
    max_clients: usize,

    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long, help = "Enable outbound link conditioning")]
    condition_link: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let conditioner = if args.condition_link {
        Some(LinkSpec {
            enabled: true,
            loss_percent: args.loss_percent,
            min_latency_ms: args.min_latency,
            max_latency_ms: args.max_latency,
            jitter_ms: args.jitter,
        })
    } else {
        None
    };

    let config = RelayConfig {
        max_clients: args.max_clients,
        tick_rate: args.tick_rate,
        timeout_secs: args.timeout_secs,
        conditioner,
    };

    let mut relay = RelayServer::new(&bind_addr, config)?;
    log::info!("relay listening on {}", relay.local_addr());
    relay.run();
    log::info!("relay shutting down");

    Ok(())
}
