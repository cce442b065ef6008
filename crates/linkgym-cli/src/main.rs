//! Link Adaptation Simulation Command-Line Interface
//!
//! This CLI provides tools for:
//! - Running a single-station link scenario under a fading channel
//! - Driving the rate selector from a built-in or remote agent
//! - Dumping the quality threshold table for a capability set
//!
//! The `run` scenario emits `meas::succ` / `meas::fail` counters every
//! measurement interval and applies any transmission-mode action that
//! arrives back within the configured wait window.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linkgym_core::gym::{
    Action, ActionValue, AgentEndpoint, ChannelTransport, EnvConfig, Measurement, NullTransport,
    StepLoop, StepOutcome, TcpTransport, Transport,
};
use linkgym_core::ratectl::{
    DeviceCaps, LinkId, ModeCatalog, ModeSelector, ModulationClass, OverrideScope, PeerCaps,
    SelectorConfig, ShannonQualityModel, ThresholdTable,
};
use linkgym_core::sim::Scheduler;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Frames per aggregate in the traffic model
const FRAMES_PER_TICK: u16 = 16;
/// Simulated milliseconds between traffic aggregates
const TICK_MS: u64 = 10;
/// Measurement group tag shared with the agent side
const GROUP: &str = "TsRateControl";

#[derive(Parser)]
#[command(name = "linkgym")]
#[command(author, version, about = "Link adaptation simulation CLI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the single-station link scenario
    Run {
        /// Environment timing configuration (JSON); built-in defaults if omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Connect to a remote agent at host:port instead of the built-in one
        #[arg(short, long)]
        agent: Option<String>,

        /// Run open loop (emit nowhere, take no actions)
        #[arg(long, conflicts_with = "agent")]
        open_loop: bool,

        /// Channel fading seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Mean link quality in dB
        #[arg(long, default_value = "25.0")]
        quality: f64,

        /// Channel width in MHz (20, 40, 80, 160)
        #[arg(long, default_value = "20")]
        width: u16,

        /// Transmit spatial streams
        #[arg(long, default_value = "1")]
        streams: u8,
    },

    /// Print the quality threshold table for a capability set
    Thresholds {
        /// Channel width in MHz (20, 40, 80, 160)
        #[arg(long, default_value = "20")]
        width: u16,

        /// Transmit spatial streams
        #[arg(long, default_value = "1")]
        streams: u8,

        /// Target bit error rate the thresholds guarantee
        #[arg(long, default_value = "1e-7")]
        ber: f64,

        /// Include 400 ns guard-interval variants for HT/VHT
        #[arg(long)]
        short_gi: bool,
    },
}

/// Running success/failure counters plus the values already reported,
/// so each measurement carries deltas rather than totals.
#[derive(Default)]
struct LinkStats {
    succ: u64,
    fail: u64,
    last_succ: u64,
    last_fail: u64,
}

struct Scenario<T: Transport> {
    selector: ModeSelector<ShannonQualityModel>,
    gym: StepLoop<T>,
    stats: LinkStats,
    rng: StdRng,
    quality_db: f64,
    mean_quality_db: f64,
    link: LinkId,
    width_mhz: u16,
    end_ms: u64,
}

/// One traffic aggregate: fade the channel, feed the selector, transmit
/// a burst and count outcomes against the chosen mode's threshold.
fn traffic_tick<T: Transport + 'static>(ctx: &mut Scenario<T>, sched: &mut Scheduler<Scenario<T>>) {
    let now = sched.now_ms();

    // Bounded random walk around the configured mean.
    let pull = (ctx.mean_quality_db - ctx.quality_db) * 0.05;
    let jitter: f64 = ctx.rng.gen_range(-1.5..1.5);
    ctx.quality_db = (ctx.quality_db + pull + jitter).clamp(2.0, 45.0);

    ctx.selector.report_control_ok(ctx.link, ctx.quality_db);
    ctx.selector.report_data_ok(ctx.link, ctx.quality_db, ctx.width_mhz, 1);

    let tx = match ctx.selector.select_data_mode(ctx.link, ctx.width_mhz, now) {
        Ok(tx) => tx,
        Err(err) => {
            error!(%err, "mode selection failed, stopping traffic");
            return;
        }
    };
    let threshold = match ctx.selector.threshold_or_rebuild(tx.mode, tx.nss, tx.width_mhz) {
        Ok(thr) => thr,
        Err(err) => {
            error!(%err, "threshold lookup failed, stopping traffic");
            return;
        }
    };

    let mut ok: u16 = 0;
    for _ in 0..FRAMES_PER_TICK {
        let instantaneous = ctx.quality_db + ctx.rng.gen_range(-3.0..3.0);
        if instantaneous >= threshold {
            ok += 1;
        }
    }
    ctx.stats.succ += u64::from(ok);
    ctx.stats.fail += u64::from(FRAMES_PER_TICK - ok);
    ctx.selector.report_ampdu_status(
        ctx.link,
        ok,
        FRAMES_PER_TICK - ok,
        ctx.quality_db,
        tx.width_mhz,
        tx.nss,
    );
    if ok == 0 {
        ctx.selector.report_final_failure(ctx.link);
    }

    if now + TICK_MS < ctx.end_ms {
        sched.schedule_at(now + TICK_MS, traffic_tick);
    }
}

/// One measurement step: emit the success/failure deltas, wait for an
/// action and install it as a per-link override.
fn step_event<T: Transport + 'static>(ctx: &mut Scenario<T>, sched: &mut Scheduler<Scenario<T>>) {
    let now = sched.now_ms();
    let Scenario { gym, stats, selector, link, .. } = ctx;
    let link = *link;

    let outcome = gym.fire(
        now,
        |t| {
            let succ = stats.succ - stats.last_succ;
            let fail = stats.fail - stats.last_fail;
            stats.last_succ = stats.succ;
            stats.last_fail = stats.fail;
            let mut m = Measurement::new(GROUP, link.0, t);
            m.append("meas::succ", succ as f64).append("meas::fail", fail as f64);
            vec![m]
        },
        |action| {
            if let Some(index) = action.value.map(|v| v.as_i64()) {
                match u8::try_from(index) {
                    Ok(index) => {
                        if let Err(err) = selector.apply_override(OverrideScope::Link(link), index)
                        {
                            warn!(%err, index, "ignoring out-of-range action");
                        }
                    }
                    Err(_) => warn!(index, "ignoring negative action"),
                }
            }
        },
    );

    match outcome {
        Ok(StepOutcome::Stepped { .. }) => {
            if let Some(at) = ctx.gym.next_event_ms() {
                sched.schedule_at(at, step_event);
            }
        }
        Ok(StepOutcome::Stopped) => {}
        Err(err) => error!(%err, "measurement step failed, loop abandoned"),
    }
}

/// Built-in agent: additive-increase / decrease on the reported failure
/// share, replying with a transmission-mode index every step.
fn spawn_builtin_agent(endpoint: AgentEndpoint) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut index: i64 = 0;
        while let Ok(batch) = endpoint.measurements.recv() {
            let (succ, fail) = batch.iter().fold((0.0, 0.0), |(s, f), m| {
                (
                    s + m.metrics.get("meas::succ").copied().unwrap_or(0.0),
                    f + m.metrics.get("meas::fail").copied().unwrap_or(0.0),
                )
            });
            if fail > succ * 0.1 {
                index = (index - 1).max(0);
            } else {
                index = (index + 1).min(11);
            }
            if endpoint.actions.send(Action::new(GROUP, 0, ActionValue::Int(index))).is_err() {
                break;
            }
        }
    })
}

fn run_scenario<T: Transport + 'static>(
    env: EnvConfig,
    transport: T,
    caps: DeviceCaps,
    seed: u64,
    quality: f64,
) -> Result<()> {
    let selector_config = SelectorConfig::default();
    let mut selector = ModeSelector::new(caps.clone(), ShannonQualityModel, selector_config)?;
    let link = LinkId(0);
    selector.register_link(
        link,
        PeerCaps {
            ht: caps.ht,
            vht: caps.vht,
            he: caps.he,
            width_mhz: caps.max_width_mhz,
            max_rx_streams: caps.max_tx_streams,
            short_gi: caps.short_gi,
        },
    );

    let end_ms = env.env_end_time_ms;
    let mut ctx = Scenario {
        selector,
        gym: StepLoop::new(env, transport),
        stats: LinkStats::default(),
        rng: StdRng::seed_from_u64(seed),
        quality_db: quality,
        mean_quality_db: quality,
        link,
        width_mhz: caps.max_width_mhz,
        end_ms,
    };

    let mut sched = Scheduler::new();
    sched.schedule_at(0, traffic_tick);
    if let Some(at) = ctx.gym.next_event_ms() {
        sched.schedule_at(at, step_event);
    }
    sched.run_until(&mut ctx, end_ms);

    let total = ctx.stats.succ + ctx.stats.fail;
    let final_mode = ctx
        .selector
        .select_data_mode(link, ctx.width_mhz, end_ms)
        .map(|tx| tx.mode.to_string())
        .unwrap_or_else(|_| "none".into());
    info!(
        steps = ctx.gym.steps_emitted(),
        frames = total,
        delivered = ctx.stats.succ,
        "scenario finished"
    );
    println!("simulated {} ms, {} measurement steps", end_ms, ctx.gym.steps_emitted());
    println!(
        "frames: {} sent, {} delivered ({:.1}%)",
        total,
        ctx.stats.succ,
        if total > 0 { 100.0 * ctx.stats.succ as f64 / total as f64 } else { 0.0 }
    );
    println!("final data mode: {final_mode}");
    Ok(())
}

fn cmd_run(
    config: Option<PathBuf>,
    agent: Option<String>,
    open_loop: bool,
    seed: u64,
    quality: f64,
    width: u16,
    streams: u8,
) -> Result<()> {
    let env = match config {
        Some(path) => EnvConfig::from_file(&path)
            .with_context(|| format!("reading environment config {}", path.display()))?,
        None => EnvConfig {
            measurement_start_time_ms: 1_000,
            measurement_interval_ms: 100,
            max_wait_time_for_action_ms: 500,
            env_end_time_ms: 30_000,
        },
    };
    env.validate().context("environment config invalid")?;

    let caps = DeviceCaps {
        max_width_mhz: width,
        max_tx_streams: streams,
        ..DeviceCaps::default()
    };

    if open_loop {
        info!("running open loop, selector is autonomous");
        return run_scenario(env, NullTransport, caps, seed, quality);
    }
    if let Some(addr) = agent {
        info!(%addr, "connecting to remote agent");
        let transport =
            TcpTransport::connect(&addr).with_context(|| format!("connecting to {addr}"))?;
        return run_scenario(env, transport, caps, seed, quality);
    }

    let (transport, endpoint) = ChannelTransport::pair();
    let handle = spawn_builtin_agent(endpoint);
    let result = run_scenario(env, transport, caps, seed, quality);
    // The agent exits once the transport side hangs up.
    let _ = handle.join();
    result
}

fn cmd_thresholds(width: u16, streams: u8, ber: f64, short_gi: bool) -> Result<()> {
    let caps = DeviceCaps {
        max_width_mhz: width,
        max_tx_streams: streams,
        short_gi,
        ..DeviceCaps::default()
    };
    let catalog = ModeCatalog::for_caps(&caps);
    let mut table = ThresholdTable::default();
    table.build(&catalog, &ShannonQualityModel, &caps, ber);

    println!("{} modes, {} threshold entries (target error rate {ber:e})", catalog.len(), table.len());
    println!("{:<16} {:>4} {:>8} {:>12} {:>10}", "mode", "nss", "width", "rate", "min snr");
    for mode in catalog.iter() {
        for nss in 1..=streams {
            let mut w = 20;
            while w <= width {
                if let Some(threshold) = table.lookup(*mode, nss, w) {
                    let guard = match mode.class {
                        ModulationClass::He => caps.he_guard_ns,
                        ModulationClass::Ht | ModulationClass::Vht if short_gi => 400,
                        _ => 800,
                    };
                    let rate = mode.data_rate(w, guard, nss) as f64 / 1e6;
                    println!(
                        "{:<16} {:>4} {:>5} MHz {:>9.1} Mbps {:>7.2} dB",
                        mode.to_string(),
                        nss,
                        w,
                        rate,
                        threshold
                    );
                }
                w *= 2;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            config,
            agent,
            open_loop,
            seed,
            quality,
            width,
            streams,
        } => cmd_run(config, agent, open_loop, seed, quality, width, streams),

        Commands::Thresholds {
            width,
            streams,
            ber,
            short_gi,
        } => cmd_thresholds(width, streams, ber, short_gi),
    }
}
