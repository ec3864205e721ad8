mod bot;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use bot::Bot;

#[derive(Parser)]
#[command(name = "netpose-bot")]
#[command(about = "Bot swarm for load-testing a netpose relay")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:27045")]
    server: String,

    #[arg(short, long, default_value_t = 10)]
    count: usize,

    #[arg(long, default_value_t = 2.0, help = "Seconds between bot spawns")]
    spawn_interval: f64,

    #[arg(long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, default_value_t = 200.0, help = "Wander field edge length")]
    field_size: f64,

    #[arg(long, help = "Stop after this many seconds")]
    duration_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr: SocketAddr = args
        .server
        .to_socket_addrs()
        .context("resolving relay address")?
        .next()
        .context("relay address resolved to nothing")?;

    log::info!("spawning {} bots against {}", args.count, server_addr);

    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);
    let dt = tick_duration.as_secs_f64();
    let started = Instant::now();

    let mut bots: Vec<Bot> = Vec::with_capacity(args.count);
    let mut next_spawn = Instant::now();
    let mut next_report = Instant::now() + Duration::from_secs(5);

    loop {
        let tick_start = Instant::now();

        if bots.len() < args.count && tick_start >= next_spawn {
            match Bot::new(server_addr, args.field_size) {
                Ok(bot) => bots.push(bot),
                Err(e) => log::error!("failed to spawn bot: {}", e),
            }
            next_spawn = tick_start + Duration::from_secs_f64(args.spawn_interval);
        }

        for bot in &mut bots {
            if let Err(e) = bot.update(dt) {
                log::error!("bot update failed: {}", e);
            }
        }

        if tick_start >= next_report {
            report(&bots);
            next_report = tick_start + Duration::from_secs(5);
        }

        if let Some(limit) = args.duration_secs {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            std::thread::sleep(tick_duration - elapsed);
        }
    }

    for bot in &mut bots {
        bot.shutdown();
    }
    report(&bots);
    log::info!("bot swarm finished after {:?}", started.elapsed());

    Ok(())
}

fn report(bots: &[Bot]) {
    let running = bots.iter().filter(|b| b.is_running()).count();
    let failed = bots.iter().filter(|b| b.has_failed()).count();
    let peers: usize = bots.iter().map(|b| b.view().peer_count()).sum();
    let poses: u64 = bots.iter().map(|b| b.view().poses_applied).sum();
    let events: u64 = bots.iter().map(|b| b.view().events_applied).sum();
    let mean_offset = if running > 0 {
        bots.iter()
            .filter(|b| b.is_running())
            .map(|b| b.playback_offset())
            .sum::<f64>()
            / running as f64
    } else {
        0.0
    };
    let spread = bots
        .iter()
        .filter_map(|b| b.view().bounds())
        .map(|(min, max)| (max - min).length())
        .fold(0.0f64, f64::max);

    log::info!(
        "bots: {} running, {} failed | peers seen: {} | poses: {} | events: {} | mean offset: {:.3}s | spread: {:.1}m",
        running,
        failed,
        peers,
        poses,
        events,
        mean_offset,
        spread
    );
}
