use anyhow::Context;
use clap::Parser;
use cleyecore::channel::{CommandChannel, Side, Transceiver};
use cleyecore::sweep::CancelToken;
use console::interactive::run_interactive;
use console::process::ProcessChannel;
use generator::synthetic::SimulatedLink;
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{LinkSelection, WorkflowConfig};
use workflow::link::{MenuSelector, NoOperator, PresetSelector, Selector};
use workflow::runner::{
    abandon_run, is_cancelled, shutdown_both, summarize, write_report, Runner,
};

mod console;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Tunes transceiver equalization from eye-scan sweeps")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Drive a simulated link instead of spawning hardware consoles
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Directory receiving the scan files
    #[arg(long)]
    results_dir: Option<PathBuf>,
    /// Number of full passes over the parameter list
    #[arg(long)]
    iterations: Option<usize>,
    #[arg(long)]
    tx_device: Option<usize>,
    #[arg(long)]
    rx_device: Option<usize>,
    #[arg(long)]
    tx_sio: Option<usize>,
    #[arg(long)]
    rx_sio: Option<usize>,
    /// Write the sweep trace as JSON
    #[arg(long)]
    report: Option<PathBuf>,
    /// Exit after the sweep instead of handing the consoles to the operator
    #[arg(long, default_value_t = false, conflicts_with = "interactive_only")]
    no_interactive: bool,
    /// Skip link setup and the sweep; go straight to the consoles
    #[arg(long, default_value_t = false)]
    interactive_only: bool,
    /// Log filter, e.g. `debug` or `cleyecore=debug` (defaults to RUST_LOG, then `info`)
    #[arg(long)]
    log_level: Option<String>,
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    }
    .with_results_dir(args.results_dir.clone())
    .with_iterations(args.iterations)
    .with_selection(LinkSelection {
        tx_device: args.tx_device,
        rx_device: args.rx_device,
        tx_sio: args.tx_sio,
        rx_sio: args.rx_sio,
    });
    config.validate()?;

    let cancel = CancelToken::new();
    watch_interrupts(cancel.clone())?;

    if args.offline {
        info!("Using the simulated link");
        let link = SimulatedLink::new(config.synthetic.clone());
        let tx = Transceiver::new(link.console(Side::Tx), Side::Tx);
        let rx = Transceiver::new(link.console(Side::Rx), Side::Rx);
        let outcome = drive(&args, Runner::new(config).with_cancel(cancel), tx, rx);
        info!("Simulated link took {} scans", link.scans_taken());
        return outcome;
    }

    info!("Spawning console instances (TX/RX)");
    let console = &config.console;
    let mut tx_console = ProcessChannel::spawn(console, "TX")
        .with_context(|| format!("spawning {}", console.executable))?;
    let mut rx_console = ProcessChannel::spawn(console, "RX")
        .with_context(|| format!("spawning {}", console.executable))?;

    info!("Waiting for the console prompt (startup)");
    tx_console
        .wait_startup()
        .context("waiting for the TX console")?;
    rx_console
        .wait_startup()
        .context("waiting for the RX console")?;

    let tx = Transceiver::new(tx_console, Side::Tx);
    let rx = Transceiver::new(rx_console, Side::Rx);
    drive(&args, Runner::new(config).with_cancel(cancel), tx, rx)
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = &args.log_level {
        builder.parse_filters(level);
    }
    if let Some(path) = &args.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// The first Ctrl+C stops the sweep before its next candidate.
fn watch_interrupts(cancel: CancelToken) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::spawn(move || {
        runtime.block_on(async {
            while signal::ctrl_c().await.is_ok() {
                if cancel.is_cancelled() {
                    warn!("Interrupt ignored; leave the console with !q");
                } else {
                    warn!("Interrupt received, stopping the sweep");
                    cancel.cancel();
                }
            }
        })
    });
    Ok(())
}

fn drive<T: CommandChannel, R: CommandChannel>(
    args: &Args,
    runner: Runner,
    mut tx: Transceiver<T>,
    mut rx: Transceiver<R>,
) -> anyhow::Result<()> {
    if !args.interactive_only {
        let link = &runner.config().link;
        let mut selector: Box<dyn Selector> = if args.no_interactive {
            Box::new(PresetSelector::new(link, NoOperator))
        } else {
            Box::new(PresetSelector::new(
                link,
                MenuSelector::new(io::stdin().lock(), io::stdout()),
            ))
        };
        let outcome = runner.run(&mut tx, &mut rx, selector.as_mut());
        match outcome {
            Ok(report) => {
                print!("{}", summarize(&report));
                if let Some(path) = &args.report {
                    if let Err(err) = write_report(&report, path) {
                        error!("{:#}", err);
                    }
                }
                println!();
                println!("All Script has been run.");
            }
            Err(err) if args.no_interactive || is_cancelled(&err) => {
                return abandon_run(&mut tx, &mut rx, err);
            }
            Err(err) => error!("{:#}", err),
        }
    }

    if args.no_interactive {
        shutdown_both(&mut tx, &mut rx);
        return Ok(());
    }
    println!("Switch to RX console:");
    run_interactive(&mut tx, &mut rx, io::stdin().lock(), io::stdout())
}
