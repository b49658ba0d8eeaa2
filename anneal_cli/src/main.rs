//! `anneal` binary: run, validate and self-check annealing process files.

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use anneal_config::DaqConfig;
use anneal_core::process::{AnnealerProcess, ChannelBank, ProcessStatus};
use anneal_core::telemetry::ChannelId;
use anneal_hardware::{SimulatedDaq, ThermalModel};
use anneal_traits::{Clock, Daq, MonotonicClock};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.daq_config {
        Some(path) => Some(load_daq_config(path)?),
        None => None,
    };
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&level, cli.json)?;

    match cli.cmd {
        Commands::Run { process, stats } => run(&process, config, stats, cli.json),
        Commands::Validate { process } => validate(&process, cli.json),
        Commands::SelfCheck => self_check(config, cli.json),
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    // RUST_LOG wins over --log-level and the config file.
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_daq_config(path: &Path) -> Result<DaqConfig> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading DAQ config {}", path.display()))?;
    let config = anneal_config::load_toml(&text)
        .wrap_err_with(|| format!("parsing DAQ config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn build_daq(config: Option<DaqConfig>, clock: Arc<dyn Clock + Send + Sync>) -> SimulatedDaq {
    match config {
        Some(cfg) => {
            tracing::info!(device = %cfg.device_id, "simulating configured device");
            SimulatedDaq::new(ThermalModel::default(), cfg.conversion, clock)
        }
        None => SimulatedDaq::with_defaults(clock),
    }
}

fn run(path: &Path, config: Option<DaqConfig>, stats: bool, json: bool) -> Result<()> {
    let mut process = AnnealerProcess::load(path)
        .wrap_err_with(|| format!("loading process file {}", path.display()))?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let daq = build_daq(config, Arc::clone(&clock));
    let bank = ChannelBank::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .wrap_err("installing signal handler")?;
    }

    tracing::info!(
        description = process.description(),
        steps = process.steps().len(),
        "starting process"
    );
    process.start(&bank, daq, clock)?;

    let mut stop_sent = false;
    loop {
        if shutdown.load(Ordering::SeqCst) && !stop_sent {
            tracing::info!("interrupt received, requesting stop");
            // The run may have settled in the meantime; nothing to do then.
            let _ = process.stop(false);
            stop_sent = true;
        }
        if process.wait(Some(Duration::from_millis(100))) {
            break;
        }
    }

    let status = process.status();
    report_run(&bank, status, stats, json);
    match status {
        ProcessStatus::Failed => eyre::bail!("process failed; see log for the fault"),
        _ => Ok(()),
    }
}

fn report_run(bank: &ChannelBank, status: ProcessStatus, stats: bool, json: bool) {
    let (_, temps) = bank.data(ChannelId::Temperature, None);
    let last_temperature = temps.last().copied();
    if json {
        let samples: serde_json::Map<String, serde_json::Value> = ChannelId::ALL
            .into_iter()
            .map(|id| (id.as_str().to_string(), bank.len(id).into()))
            .collect();
        let summary = serde_json::json!({
            "status": status.to_string(),
            "last_temperature": last_temperature,
            "samples": samples,
        });
        println!("{summary}");
        return;
    }
    match last_temperature {
        Some(t) => println!("process {status}, final temperature {t:.1} C"),
        None => println!("process {status}, no samples recorded"),
    }
    if stats {
        for id in ChannelId::ALL {
            println!("  {id}: {} samples", bank.len(id));
        }
    }
}

fn validate(path: &Path, json: bool) -> Result<()> {
    let process = AnnealerProcess::load(path)
        .wrap_err_with(|| format!("loading process file {}", path.display()))?;
    if json {
        let steps: Vec<&str> = process.steps().iter().map(|s| s.kind()).collect();
        let summary = serde_json::json!({
            "description": process.description(),
            "steps": steps,
        });
        println!("{summary}");
    } else {
        println!("{}: {} steps, ok", process.description(), process.steps().len());
        for (i, step) in process.steps().iter().enumerate() {
            println!("  {i}: {}", step.kind());
        }
    }
    Ok(())
}

fn self_check(config: Option<DaqConfig>, json: bool) -> Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut daq = build_daq(config, clock);
    daq.initialize().map_err(|e| eyre::eyre!(e))?;
    let temperature = daq.read_temperature().map_err(|e| eyre::eyre!(e))?;
    daq.finalize().map_err(|e| eyre::eyre!(e))?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "ok": true, "temperature": temperature })
        );
    } else {
        println!("self-check ok, temperature {temperature:.1} C");
    }
    Ok(())
}
