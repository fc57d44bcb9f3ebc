use anyhow::{Result, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, stdout};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tigr_core::device::Device;
use tigr_core::error::{Error, Tier};
use tigr_core::extract::{Dataset, ExtractOptions};
use tigr_core::read::{DEFAULT_MAX_SECTORS, SECTOR_SIZE};
use tigr_core::save::DEFAULT_OUTPUT;

#[cfg(unix)]
use libc::ECHOCTL;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use termios::{TCSANOW, Termios, tcsetattr};

#[derive(Parser)]
#[command(name = "tigr")]
#[command(about = "Pull muon readings off a TIGR detector SD card", version)]
struct Cli {
    /// Increase log output (-v for info, -vv for debug). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the readings from a card into a CSV file
    Extract {
        /// Device or card dump to read. Prompts with a device list if omitted.
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// CSV file to write
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Number of 512-byte sectors to read from the start of the card
        #[arg(short, long, default_value_t = DEFAULT_MAX_SECTORS)]
        sectors: NonZeroU32,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Skip verifying the written CSV
        #[arg(short = 'n', long = "no-verify")]
        no_verify: bool,

        /// Fail if a record contains bytes that are not ASCII
        #[arg(long)]
        strict: bool,
    },
    /// Show what a card holds without writing anything
    Inspect {
        /// Device or card dump to read
        #[arg(required = true)]
        source: PathBuf,

        /// Number of 512-byte sectors to read from the start of the card
        #[arg(short, long, default_value_t = DEFAULT_MAX_SECTORS)]
        sectors: NonZeroU32,

        /// Fail if a record contains bytes that are not ASCII
        #[arg(long)]
        strict: bool,

        /// Number of readings to preview
        #[arg(short, long, default_value_t = 5)]
        lines: usize,
    },
    /// List attached removable devices
    List,
}

/// A helper struct that, on Unix, disables `ECHOCTL` for the terminal.
///
/// `ECHOCTL` is the terminal flag that causes Ctrl+C to be printed as `^C`.
/// Disabling it keeps the cancellation message clean. The original terminal
/// state is restored when this struct is dropped.
struct TermRestorer {
    #[cfg(unix)]
    original_termios: Option<Termios>,
}

impl TermRestorer {
    fn new() -> Self {
        #[cfg(unix)]
        {
            let fd = stdout().as_raw_fd();
            if !stdout().is_terminal() {
                return Self {
                    original_termios: None,
                };
            }

            let original_termios = Termios::from_fd(fd).ok().and_then(|original| {
                let mut quiet = original;
                quiet.c_lflag &= !ECHOCTL;
                tcsetattr(fd, TCSANOW, &quiet).ok().map(|_| original)
            });

            Self { original_termios }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }
}

impl Drop for TermRestorer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(ref original_termios) = self.original_termios {
            let fd = stdout().as_raw_fd();
            tcsetattr(fd, TCSANOW, original_termios).ok();
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Presents an interactive menu for the user to select a device.
///
/// The last device is preselected: card readers enumerate after fixed disks.
fn select_device(devices: &[Device], prompt: &str) -> Result<Device> {
    if devices.is_empty() {
        return Err(anyhow!(
            "No removable devices found. Insert the card, or pass --device explicitly."
        ));
    }

    let items: Vec<String> = devices.iter().map(|d| d.to_string()).collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&items)
        .default(devices.len() - 1)
        .interact()?;

    Ok(devices[selection].clone())
}

/// Presents a final "Yes/No" confirmation to the user.
fn confirm_operation(prompt: &str) -> Result<bool> {
    let confirmation = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmation)
}

/// Warns when a raw device is about to be read without root.
fn warn_without_raw_access(source: &Path) {
    if source.starts_with("/dev") && !tigr_core::platform::has_raw_access() {
        println!(
            "{} Reading raw devices usually needs root. If this fails, re-run with sudo.",
            style("NOTE:").yellow().bold()
        );
    }
}

/// Reads and extracts `source` behind a spinner.
fn read_with_spinner(source: &Path, sectors: NonZeroU32, strict: bool) -> Result<Dataset, Error> {
    let read_pb = ProgressBar::new_spinner();
    read_pb.set_prefix("Reading");
    if let Ok(spinner) =
        ProgressStyle::default_spinner().template("{prefix:12} [{elapsed_precise}] {spinner:.green} {msg}")
    {
        read_pb.set_style(spinner);
    }

    let on_read_start = |len: u64| {
        read_pb.set_message(format!(
            "{} sectors ({} KB) from {}",
            len / SECTOR_SIZE as u64,
            len / 1024,
            source.display()
        ));
        read_pb.enable_steady_tick(Duration::from_millis(100));
    };

    let options = ExtractOptions { strict };
    let result = tigr_core::extract_from(source, sectors, &options, on_read_start);

    match &result {
        Ok(_) => read_pb.finish_with_message("Read complete."),
        Err(_) => read_pb.finish_with_message("❌ Operation failed."),
    }
    result
}

fn print_stats(dataset: &Dataset) {
    let stats = dataset.stats();
    println!(
        "  Anchor at offset {}, {} null bytes and {} non-ASCII bytes removed, {} lines dropped.",
        stats.anchor_offset, stats.nulls_removed, stats.non_ascii_dropped, stats.lines_dropped
    );
    if stats.altered_records > 0 {
        println!(
            "  {} {} record(s) had unreadable bytes removed.",
            style("WARNING:").yellow().bold(),
            stats.altered_records
        );
    }
    if !dataset.has_header() {
        println!(
            "  {} No header line survived; the file has data rows only.",
            style("WARNING:").yellow().bold()
        );
    }
}

fn run(cli: Cli, running: Arc<AtomicBool>) -> Result<()> {
    match cli.command {
        Commands::Extract {
            device,
            output,
            sectors,
            yes,
            no_verify,
            strict,
        } => {
            let source = match device {
                Some(path) => path,
                None => {
                    let devices = tigr_core::platform::get_removable_devices()?;
                    select_device(&devices, "Select the TIGR card to READ from")?.path
                }
            };

            println!(
                "This will read the first {} sectors ({} KB) of the card.",
                sectors,
                tigr_core::read::window_len(sectors) / 1024
            );
            println!("  Device: {}", style(source.display()).cyan());
            println!("  Output: {}", style(output.display()).cyan());
            println!();

            if !yes && !confirm_operation("Continue?")? {
                println!("Extraction cancelled.");
                return Ok(());
            }

            warn_without_raw_access(&source);

            let dataset = read_with_spinner(&source, sectors, strict)?;

            if !running.load(Ordering::SeqCst) {
                println!("Extraction cancelled. Nothing was written.");
                return Ok(());
            }

            let report = tigr_core::save::run(&dataset, &output, !no_verify).map_err(Error::from)?;

            println!(
                "\n✨ Extracted {} readings to {}.",
                style(dataset.reading_count()).green().bold(),
                style(report.path.display()).cyan()
            );
            print_stats(&dataset);
            if report.verified {
                println!("  SHA-256 {} (verified)", report.sha256);
            }
            println!(
                "\nOpen tigr_analyzer.html and load {} to visualize the run.",
                style(report.path.display()).cyan()
            );
        }
        Commands::Inspect {
            source,
            sectors,
            strict,
            lines,
        } => {
            warn_without_raw_access(&source);

            let dataset = read_with_spinner(&source, sectors, strict)?;

            println!();
            match dataset.header() {
                Some(header) => println!("  Header:   {}", style(header.as_str()).bold()),
                None => println!("  Header:   {}", style("(missing)").yellow()),
            }
            println!("  Readings: {}", style(dataset.reading_count()).green().bold());
            print_stats(&dataset);

            if lines > 0 && dataset.reading_count() > 0 {
                println!();
                for record in dataset.data().take(lines) {
                    println!("  {:>6}  {}", record.line_number(), record.as_str());
                }
                if dataset.reading_count() > lines {
                    println!("  {:>6}  ...", "");
                }
            }
        }
        Commands::List => {
            let devices = tigr_core::platform::get_removable_devices()?;
            if devices.is_empty() {
                println!("No removable devices found.");
                return Ok(());
            }

            println!("Found {} removable devices:", devices.len());
            println!(
                "\n  {:<22} {:<16} {:<10} {}",
                "DEVICE", "NAME", "SIZE", "LOCATION"
            );
            println!("  {:-<22} {:-<16} {:-<10} {:-<20}", "", "", "", "");
            for device in devices {
                let size = device.size_display();
                let location = if device.mount_point.is_empty() {
                    "(Not mounted)".to_string()
                } else {
                    device.mount_point
                };
                println!(
                    "  {:<22} {:<16} {:>10}  {}",
                    device.path.display(),
                    device.name,
                    size,
                    location
                );
            }
        }
    }

    Ok(())
}

/// Prints a failure and picks the exit code: 2 when the card was read but
/// holds no usable dataset, 1 for everything else.
fn report_error(err: &anyhow::Error) -> ExitCode {
    let Some(core) = err.downcast_ref::<Error>() else {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        return ExitCode::from(1);
    };

    eprintln!("\n❌ {}", style(core).red().bold());
    eprintln!("   {}", core.hint());
    log::debug!("{} failure: {core:?}", core.tier());

    if core.tier() == Tier::Content {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

fn main() -> ExitCode {
    // Restores the terminal when main() returns.
    let _term_restorer = TermRestorer::new();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    // The read itself cannot be interrupted; Ctrl+C is honoured between stages.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }

    match run(cli, running) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}
