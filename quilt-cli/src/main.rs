use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quilt_core::core_canvas::presence::{spawn_sweeper, PresenceChannel};
use quilt_core::core_canvas::sync::{memory_transport, SessionReport, SyncSession};
use quilt_core::core_canvas::{EntityId, Rect, Replica, SharedReplica, Site};
use quilt_core::logging::{init_logging_with_config, LogLevel};
use quilt_core::simulate::{self, random_rect, SimulationConfig};
use quilt_core::EngineConfig;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "quilt")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    /// TOML configuration file; QUILT_* environment variables still apply
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a randomized convergence check and print a JSON report
    Simulate {
        #[arg(long, default_value_t = 3)]
        replicas: usize,

        #[arg(long, default_value_t = 500)]
        ops: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Extra duplicate deliveries per replica
        #[arg(long, default_value_t = 50)]
        duplicates: usize,

        /// Size of the entity pool edits draw from
        #[arg(long, default_value_t = 32)]
        entities: usize,
    },

    /// Sync two in-process replicas, drop the link, edit offline, reconnect
    SyncDemo {
        #[arg(long, default_value_t = 20)]
        entities: usize,

        /// Offline edits per side between the two sessions
        #[arg(long, default_value_t = 10)]
        offline_edits: usize,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env()?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(&config.logging)?;
    if config.metrics.enabled {
        quilt_core::metrics::init_metrics();
    }

    match args.command {
        Command::Simulate { replicas, ops, seed, duplicates, entities } => {
            let sim = SimulationConfig {
                replicas,
                ops,
                seed,
                duplicates,
                entities,
                options: config.replica_options(),
                ..Default::default()
            };
            let report = simulate::run(&sim)?;
            println!("{}", report.to_json()?);
            if !report.passed() {
                bail!("simulation with seed {seed} did not converge");
            }
        }
        Command::SyncDemo { entities, offline_edits } => sync_demo(&config, entities, offline_edits).await?,
        Command::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn sync_demo(config: &EngineConfig, entities: usize, offline_edits: usize) -> Result<()> {
    let a = Replica::with_options(config.site(), config.replica_options()).into_shared();
    let b = Replica::with_options(Site::generate(), config.replica_options()).into_shared();
    let mut rng = rand::rng();

    let mut ids: Vec<EntityId> = Vec::with_capacity(entities);
    for i in 0..entities {
        let target = if i % 2 == 0 { &a } else { &b };
        let (id, _) = lock(target)?.create(random_rect(&mut rng, 1_000.0, 40.0))?;
        ids.push(id);
    }

    info!(entities, "first session");
    let first = run_session(&a, &b, None).await?;

    if ids.is_empty() {
        warn!("no entities, skipping offline edits");
    } else {
        for _ in 0..offline_edits {
            let id = ids[rng.random_range(0..ids.len())];
            lock(&a)?.apply_local(id, "x", rng.random_range(0.0..1_000.0))?;
            let id = ids[rng.random_range(0..ids.len())];
            lock(&b)?.apply_local(id, "label", format!("edited offline {}", rng.random_range(0..100)))?;
        }
    }

    info!(offline_edits, "link dropped and restored, second session");
    let presence = (
        PresenceChannel::new(lock(&a)?.site(), config.presence.capacity),
        PresenceChannel::new(lock(&b)?.site(), config.presence.capacity),
    );
    let sweeper = spawn_sweeper(presence.1.clone(), config.presence.sweep_interval);
    let second = run_session(&a, &b, Some(&presence)).await?;
    let peers_seen = presence.1.len()?;
    sweeper.shutdown().await;

    let (converged, live, viewport) = {
        let a = lock(&a)?;
        let b = lock(&b)?;
        a.check_index()?;
        b.check_index()?;
        let viewport = Rect::new(0.0, 0.0, 500.0, 500.0);
        (a.store() == b.store(), a.live_entities().count(), a.query_ids(viewport).len())
    };

    let summary = serde_json::json!({
        "converged": converged,
        "live_entities": live,
        "in_viewport": viewport,
        "presence_peers_seen": peers_seen,
        "first_session": session_json(&first),
        "second_session": session_json(&second),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !converged {
        bail!("replicas diverged");
    }
    Ok(())
}

type PresencePair = (PresenceChannel, PresenceChannel);

/// Run one session pair until both stores match, then shut it down
async fn run_session(a: &SharedReplica, b: &SharedReplica, presence: Option<&PresencePair>) -> Result<(SessionReport, SessionReport)> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (ta, tb) = memory_transport();

    let mut left = SyncSession::new(a.clone(), ta).with_shutdown(stop_rx.clone());
    let mut right = SyncSession::new(b.clone(), tb).with_shutdown(stop_rx);
    if let Some((pa, pb)) = presence {
        left = left.with_presence(pa.clone());
        right = right.with_presence(pb.clone());
    }
    let left = tokio::spawn(left.run());
    let right = tokio::spawn(right.run());

    if let Some((pa, pb)) = presence {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pa.publish(b"demo cursor".to_vec(), Duration::from_secs(30))?;
        pb.publish(b"demo cursor".to_vec(), Duration::from_secs(30))?;
    }

    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if lock(a)?.store() == lock(b)?.store() {
                return Ok::<_, anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if presence.is_some() {
        // let presence frames drain before the link closes
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // sessions that already ended have dropped their receivers
    let _ = stop_tx.send(true);

    let reports = (left.await??, right.await??);
    match waited {
        Ok(result) => result?,
        Err(_) => bail!("replicas did not converge within 10s"),
    }
    Ok(reports)
}

fn session_json((left, right): &(SessionReport, SessionReport)) -> serde_json::Value {
    serde_json::json!({
        "a_backlog": left.backlog,
        "b_backlog": right.backlog,
        "a_sent": left.ops_sent,
        "b_sent": right.ops_sent,
        "a_end": format!("{:?}", left.end),
        "b_end": format!("{:?}", right.end),
    })
}

fn lock(replica: &SharedReplica) -> Result<std::sync::MutexGuard<'_, Replica>> {
    Ok(quilt_core::core_canvas::lock_replica(replica)?)
}
