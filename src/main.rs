//! proxlock CLI
//!
//! Usage:
//!   proxlock setup                          # Discover, pair over HTTP, optionally monitor
//!   proxlock setup --monitor                # Pair, then go straight into monitoring
//!   proxlock monitor                        # Monitor the paired device
//!   proxlock monitor --simulate "-50,none"  # Replay scripted samples, never locks
//!   proxlock status --json                  # Stored trust record as JSON
//!   proxlock settings --threshold -75       # Validated settings update

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use proxlock::core::{
    local_ip, pairing_url, render_qr, run_server, AppState, BtmgmtScanner, DeviceDiscovery,
    DisabledActuator, LockActuator, Monitor, MonitorOutcome, MonitorRegistry, PairingEvent,
    PairingSelector, PairingSession, SampleSource, ScriptedSource, SystemLockActuator, TrustStore,
};
use proxlock::types::{CandidateDevice, PairingPhase, SampleReport, SettingsUpdate, SignalQuality, TrustRecord};
use proxlock::{ProxlockError, Result, DISCOVERY_WINDOW_SECS, PAIRING_TIMEOUT_SECS, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "proxlock",
    version = VERSION,
    about = "Lock this machine when your phone walks away",
    long_about = "proxlock pairs with a phone over Bluetooth and watches its signal\n\
                  strength. When the phone stays weak or absent for the configured\n\
                  delay, the session is locked.\n\n\
                  States:\n  \
                  NEAR    - Signal above threshold\n  \
                  FAR     - Weak or missing, counting toward the lock\n  \
                  LOCKED  - Lock issued, monitoring ends"
)]
struct Args {
    /// Trust record path (default: <config dir>/proxlock/trust.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    no_color: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log file (default: <data dir>/proxlock/proxlock.log)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover nearby devices and pair over HTTP
    Setup {
        /// Pairing server address
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Discovery window in seconds
        #[arg(long, default_value_t = DISCOVERY_WINDOW_SECS)]
        discovery_secs: u64,

        /// Seconds to wait for confirmation
        #[arg(long, default_value_t = PAIRING_TIMEOUT_SECS)]
        timeout_secs: u64,

        /// Bluetooth adapter
        #[arg(long, default_value = "hci0")]
        adapter: String,

        /// Start monitoring as soon as pairing completes
        #[arg(long)]
        monitor: bool,
    },

    /// Monitor the paired device and lock when it leaves
    Monitor {
        /// Report the lock decision without locking
        #[arg(long)]
        dry_run: bool,

        /// Replay comma separated samples (e.g. "-50,-62,none,-90") instead of scanning
        #[arg(long, allow_hyphen_values = true)]
        simulate: Option<String>,

        /// Bluetooth adapter
        #[arg(long, default_value = "hci0")]
        adapter: String,
    },

    /// Show the paired device and settings
    Status,

    /// Forget the paired device
    Reset,

    /// Show or change settings
    Settings {
        /// RSSI threshold in dBm (-100 to -30)
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<i32>,

        /// Seconds out of range before locking (5 to 60)
        #[arg(long)]
        lock_delay: Option<u64>,

        /// Seconds between samples (1 to 60)
        #[arg(long)]
        scan_interval: Option<u64>,

        /// Enable or disable locking
        #[arg(long, value_enum)]
        auto_lock: Option<Toggle>,
    },

    /// Lock the screen once to check the lock mechanism
    TestLock,

    /// Show recent log lines
    Logs {
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// Output switches shared by every command
#[derive(Clone, Copy, Debug)]
struct OutputOpts {
    json: bool,
    no_color: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    let log_path = args.log_file.clone().unwrap_or_else(logging::default_log_path);
    let _logging_guard = logging::init(args.verbose, &log_path);

    let store = TrustStore::new(args.config.clone().unwrap_or_else(TrustStore::default_path));
    let out = OutputOpts {
        json: args.json,
        no_color: args.no_color,
    };

    let result = match args.command {
        Commands::Setup {
            addr,
            discovery_secs,
            timeout_secs,
            adapter,
            monitor,
        } => {
            let opts = SetupOpts {
                addr,
                discovery: Duration::from_secs(discovery_secs),
                timeout: Duration::from_secs(timeout_secs),
                adapter,
                monitor,
            };
            run_setup(store, opts, out).await
        }
        Commands::Monitor {
            dry_run,
            simulate,
            adapter,
        } => run_monitor(&store, dry_run, simulate.as_deref(), &adapter, out).await,
        Commands::Status => run_status(&store, out),
        Commands::Reset => run_reset(&store, out),
        Commands::Settings {
            threshold,
            lock_delay,
            scan_interval,
            auto_lock,
        } => {
            let update = SettingsUpdate {
                rssi_threshold: threshold,
                lock_delay_seconds: lock_delay,
                scan_interval_seconds: scan_interval,
                auto_lock_enabled: auto_lock.map(|t| t == Toggle::On),
            };
            run_settings(&store, &update, out)
        }
        Commands::TestLock => run_test_lock(out).await,
        Commands::Logs { lines } => run_logs(&log_path, lines),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::ExitCode::FAILURE
        }
    }
}

// =============================================================================
// SETUP
// =============================================================================

/// Seconds between "still waiting" lines during pairing
const PAIRING_PROGRESS_SECS: u64 = 30;

struct SetupOpts {
    addr: String,
    discovery: Duration,
    timeout: Duration,
    adapter: String,
    monitor: bool,
}

/// Discover, serve the pairing exchange, then optionally monitor
async fn run_setup(store: TrustStore, opts: SetupOpts, out: OutputOpts) -> Result<()> {
    print_header("Pairing", out);

    let scanner = BtmgmtScanner::new(&opts.adapter);
    println!("Scanning for devices ({}s)...", opts.discovery.as_secs());
    let discovered = scanner.discover(opts.discovery).await?;

    let mut session = PairingSession::with_timeout(PairingSelector::new(store.clone()), opts.timeout);
    session.offer_candidates(discovered)?;
    print_candidates(session.candidates(), out);

    let interrupt = interrupt_token();
    let (reports, _) = broadcast::channel(100);
    let (state, mut events) = AppState::new(session, reports.clone(), interrupt.child_token());

    let server_stop = CancellationToken::new();
    let mut server = {
        let addr = opts.addr.clone();
        let state = Arc::clone(&state);
        let stop = server_stop.clone();
        tokio::spawn(async move { run_server(&addr, state, stop.cancelled_owned()).await })
    };

    let url = pairing_url(&opts.addr, local_ip().await);
    info!(%url, "Pairing URL");
    if !out.json {
        println!(
            "Open {} from your phone, then POST /confirm ({}s to confirm)",
            url,
            opts.timeout.as_secs()
        );
        if let Some(qr) = render_qr(&url) {
            println!("{}", qr);
        }
    }

    let mut sweep = tokio::time::interval(Duration::from_secs(1));
    let mut waited_secs = 0u64;

    let record = loop {
        tokio::select! {
            _ = interrupt.cancelled() => {
                let phase = state.session.lock().await.cancel();
                server_stop.cancel();
                println!("Pairing ended: {}", phase);
                return Ok(());
            }
            _ = sweep.tick() => {
                let mut session = state.session.lock().await;
                let phase = session.expire_if_due();
                if phase == PairingPhase::TimedOut {
                    server_stop.cancel();
                    return Err(ProxlockError::TimedOut);
                }
                waited_secs += 1;
                if phase == PairingPhase::AwaitingConfirmation && waited_secs % PAIRING_PROGRESS_SECS == 0 {
                    let remaining = session.remaining().map(|d| d.as_secs()).unwrap_or(0);
                    info!(waited_secs, remaining, "Waiting for confirmation");
                    if !out.json {
                        println!("Still waiting... ({}s elapsed, {}s left)", waited_secs, remaining);
                    }
                }
            }
            event = events.recv() => match event {
                Some(PairingEvent::Confirmed(record)) => {
                    print_paired(&record, out);
                    if opts.monitor {
                        break record;
                    }
                    println!("POST /monitor to start monitoring, Ctrl-C to finish");
                }
                Some(PairingEvent::MonitorRequested(record)) => break record,
                None => return Ok(()),
            },
            joined = &mut server => {
                return joined.map_err(|e| ProxlockError::io("pairing server task", std::io::Error::other(e)))?;
            }
        }
    };

    // POST /stop or Ctrl-C
    let stop = state.stop_token();
    let scanner = BtmgmtScanner::new(&opts.adapter);
    let outcome = if record.auto_lock_enabled {
        drive(&store, &record, scanner, SystemLockActuator::new(), reports, stop, out).await
    } else {
        drive(&store, &record, scanner, DisabledActuator, reports, stop, out).await
    };

    server_stop.cancel();
    if let Ok(Err(e)) = server.await {
        error!(error = %e, "Pairing server stopped with error");
    }

    report_outcome(&outcome?, out)
}

fn print_candidates(candidates: &[CandidateDevice], out: OutputOpts) {
    if out.json {
        println!("{}", serde_json::to_string_pretty(candidates).unwrap_or_default());
        return;
    }
    println!("Found {} device(s):", candidates.len());
    for (i, device) in candidates.iter().enumerate() {
        let quality = SignalQuality::classify(device.rssi);
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "?? dBm".to_string());
        println!(
            "  {}. {:24} {}  {:>8}  {}",
            i + 1,
            device.display_name(),
            device.address,
            rssi,
            quality
        );
    }
}

fn print_paired(record: &TrustRecord, out: OutputOpts) {
    if out.json {
        println!("{}", serde_json::to_string_pretty(record).unwrap_or_default());
        return;
    }
    println!(
        "{} Paired with {} ({})",
        "✓".green().bold(),
        record.display_name(),
        record.device_address.as_deref().unwrap_or("-")
    );
    println!(
        "  threshold {} dBm, lock after {}s",
        record.rssi_threshold, record.lock_delay_seconds
    );
}

// =============================================================================
// MONITOR
// =============================================================================

async fn run_monitor(
    store: &TrustStore,
    dry_run: bool,
    simulate: Option<&str>,
    adapter: &str,
    out: OutputOpts,
) -> Result<()> {
    let record = store.load()?;
    if !record.is_paired() {
        return Err(ProxlockError::NotPaired);
    }

    print_header("Monitoring", out);
    if !out.json {
        println!(
            "{} ({}) threshold {} dBm, {} far samples to lock",
            record.display_name(),
            record.device_address.as_deref().unwrap_or("-"),
            record.rssi_threshold,
            record.required_count()
        );
    }

    let (reports, _) = broadcast::channel(100);
    let interrupt = interrupt_token();

    let outcome = match simulate {
        Some(script) => {
            let source = ScriptedSource::parse(script)?.with_name(record.display_name());
            drive(store, &record, source, DisabledActuator, reports, interrupt, out).await?
        }
        None if dry_run || !record.auto_lock_enabled => {
            drive(store, &record, BtmgmtScanner::new(adapter), DisabledActuator, reports, interrupt, out).await?
        }
        None => {
            let scanner = BtmgmtScanner::new(adapter);
            drive(store, &record, scanner, SystemLockActuator::new(), reports, interrupt, out).await?
        }
    };

    report_outcome(&outcome, out)
}

/// Run the monitor under the record's lock and print its reports as they arrive
async fn drive<S, A>(
    store: &TrustStore,
    record: &TrustRecord,
    mut source: S,
    actuator: A,
    reports: broadcast::Sender<SampleReport>,
    stop: CancellationToken,
    out: OutputOpts,
) -> Result<MonitorOutcome>
where
    S: SampleSource,
    A: LockActuator,
{
    let _lock = store.lock_monitoring(record.address()?)?;
    let monitor = Monitor::new(MonitorRegistry::new(), reports);

    let printer_done = CancellationToken::new();
    let printer = tokio::spawn(print_reports(monitor.subscribe(), printer_done.clone(), out));

    let result = monitor.run(record, &mut source, &actuator, stop).await;

    printer_done.cancel();
    let _ = printer.await;
    result
}

async fn print_reports(
    mut rx: broadcast::Receiver<SampleReport>,
    done: CancellationToken,
    out: OutputOpts,
) {
    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Ok(report) => print_report(&report, out),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            },
            _ = done.cancelled() => break,
        }
    }
    while let Ok(report) = rx.try_recv() {
        print_report(&report, out);
    }
}

fn print_report(report: &SampleReport, out: OutputOpts) {
    if out.json {
        println!("{}", serde_json::to_string(report).unwrap_or_default());
    } else if out.no_color {
        println!("{}", report.to_parseable_string());
    } else {
        println!("{}", report.to_terminal_string());
    }
}

fn report_outcome(outcome: &MonitorOutcome, out: OutputOpts) -> Result<()> {
    if out.json {
        println!("{}", serde_json::to_string(outcome).unwrap_or_default());
    } else {
        match outcome {
            MonitorOutcome::Locked { samples, method } => {
                println!("🔒 Locked via {} after {} samples", method, samples);
            }
            MonitorOutcome::LockFailed { samples, .. } => {
                println!("Lock decision after {} samples, but locking failed", samples);
            }
            MonitorOutcome::Stopped { samples } => {
                println!("Monitoring stopped after {} samples", samples);
            }
        }
    }

    match outcome {
        MonitorOutcome::LockFailed { reason, .. } => Err(ProxlockError::LockActuator(reason.clone())),
        _ => Ok(()),
    }
}

/// Cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            child.cancel();
        }
    });
    token
}

// =============================================================================
// RECORD COMMANDS
// =============================================================================

fn run_status(store: &TrustStore, out: OutputOpts) -> Result<()> {
    let record = store.load()?;

    if out.json {
        println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
        return Ok(());
    }

    if !record.is_paired() {
        println!("No device configured. Run `proxlock setup` to pair.");
        return Ok(());
    }

    print_record(&record);
    println!("  {:14} {}", "config", store.path().display());
    Ok(())
}

fn run_reset(store: &TrustStore, out: OutputOpts) -> Result<()> {
    let removed = store.reset()?;
    if out.json {
        println!("{}", serde_json::json!({ "success": true, "removed": removed }));
    } else if removed {
        println!("Paired device forgotten");
    } else {
        println!("Nothing to reset");
    }
    Ok(())
}

fn run_settings(store: &TrustStore, update: &SettingsUpdate, out: OutputOpts) -> Result<()> {
    let record = store.update_settings(update)?;

    if out.json {
        println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &TrustRecord) {
    let auto_lock = if record.auto_lock_enabled {
        "on".green()
    } else {
        "off".yellow()
    };
    println!("{}", record.display_name().bold());
    println!("  {:14} {}", "address", record.device_address.as_deref().unwrap_or("-"));
    println!("  {:14} {} dBm", "threshold", record.rssi_threshold);
    println!("  {:14} {}s", "lock delay", record.lock_delay_seconds);
    println!("  {:14} {}s", "scan interval", record.scan_interval_seconds);
    println!("  {:14} {}", "far samples", record.required_count());
    println!("  {:14} {}", "auto-lock", auto_lock);
    if let Some(paired_at) = record.paired_at {
        println!("  {:14} {}", "paired", paired_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

async fn run_test_lock(out: OutputOpts) -> Result<()> {
    if !out.json {
        println!("Locking in 3 seconds...");
    }
    tokio::time::sleep(Duration::from_secs(3)).await;

    let method = SystemLockActuator::new().lock().await?;
    if out.json {
        println!("{}", serde_json::json!({ "success": true, "method": method }));
    } else {
        println!("Locked via {}", method);
    }
    Ok(())
}

fn run_logs(path: &std::path::Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("No log file at {}", path.display());
        return Ok(());
    }
    let tail = logging::tail(path, lines).map_err(|e| ProxlockError::io("reading log file", e))?;
    for line in tail {
        println!("{}", line);
    }
    Ok(())
}

fn print_header(mode: &str, out: OutputOpts) {
    if out.json {
        return;
    }
    let title = format!("proxlock {} · {}", VERSION, mode);
    if out.no_color {
        println!("{}", title);
    } else {
        println!("{}", title.bold().cyan());
    }
    println!();
}
