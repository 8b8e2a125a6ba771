//! # mca_listmode_cli
//!
//! Part of the mca_listmode crate family.
//!
//! This is the command line application for watching and converting CAEN MCA list-mode
//! files.
//!
//! ## Install
//!
//! Use `cargo install --path ./mca_listmode_cli`
//!
//! ## Use
//!
//! ```bash
//! mca_listmode_cli new -p config.yml
//! mca_listmode_cli watch -p config.yml -o spectra.yml -s 60
//! mca_listmode_cli convert run_19_ch000.dat -o run_19_ch000.yml -p config.yml -c 0
//! mca_listmode_cli dump run_19_ch000.dat
//! ```
//!
//! `watch` tails the list file of every configured channel and keeps the spectra and
//! counters of all channels in the output file, rewritten whenever new data arrives or a
//! channel is reset. It runs for the given number of seconds, or until interrupted.
//! `convert` runs a complete list file through the same pipeline and writes the event
//! table, spectra and counters.
//! `dump` prints one line per record.
//!
//! The library log is written to `mca_listmode.log` in the working directory.
use clap::{Arg, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use libmca_listmode::channel::ChannelSnapshot;
use libmca_listmode::config::{ChannelConfig, Config};
use libmca_listmode::converter::{convert_file, dump_records};
use libmca_listmode::pass_status::PassStatus;
use libmca_listmode::poller::Poller;

const LIBRARY_LOG: &str = "./mca_listmode.log";

#[derive(Debug, Serialize)]
struct WatchOutput<'a> {
    channels: &'a [ChannelSnapshot],
}

fn make_template_config(path: &Path) {
    let config = Config::default();
    if let Err(e) = config.write_config_file(path) {
        log::error!("Could not write template config: {e}");
    }
}

fn init_library_log() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from(LIBRARY_LOG))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn write_snapshots(poller: &Poller, path: &Path) {
    let mut snapshots = Vec::with_capacity(poller.n_channels());
    for channel in 0..poller.n_channels() {
        match poller.snapshot(channel) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                log::error!("{e}");
                return;
            }
        }
    }
    let output = WatchOutput {
        channels: &snapshots,
    };
    let file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            log::error!("Could not create {}: {e}", path.display());
            return;
        }
    };
    if let Err(e) = serde_yaml::to_writer(BufWriter::new(file), &output) {
        log::error!("Could not write spectra to {}: {e}", path.display());
    }
}

fn status_message(status: &PassStatus) -> String {
    let mut message = format!(
        "Channel {}: {} events, {} frames",
        status.channel, status.events_processed, status.frames
    );
    if status.held {
        message.push_str(" (replay, held)");
    }
    if let Some(e) = &status.error {
        message.push_str(&format!(" (error: {e})"));
    }
    message
}

fn watch(config: Config, output: &Path, seconds: Option<u64>, pb_manager: &MultiProgress) {
    let poller = Arc::new(Poller::new(&config));
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = std::sync::mpsc::channel::<PassStatus>();

    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bars: Vec<ProgressBar> = (0..poller.n_channels())
        .map(|_| pb_manager.add(ProgressBar::new_spinner().with_style(style.clone())))
        .collect();

    let thread_poller = poller.clone();
    let thread_stop = stop.clone();
    // Spawn the task!
    let handle = std::thread::spawn(move || thread_poller.run(&thread_stop, &tx));

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut changed = false;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            stop.store(true, Ordering::Relaxed);
            break;
        }
        if handle.is_finished() {
            break;
        }
        let status = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(status) => status,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };
        if let Some(reason) = status.reset {
            log::info!("Channel {} was reset ({reason:?})", status.channel);
        }
        changed |= status.changed();
        if let Some(bar) = bars.get(status.channel) {
            bar.set_message(status_message(&status));
            bar.tick();
        }
        // the last channel closes a tick
        if status.channel + 1 == poller.n_channels() && changed {
            write_snapshots(&poller, output);
            changed = false;
        }
    }

    match handle.join() {
        Ok(Ok(())) => log::info!("Polling finished."),
        Ok(Err(e)) => log::error!("Polling failed with error: {e}"),
        Err(_) => log::error!("Failed to join polling task!"),
    }
    for bar in bars {
        bar.finish();
    }
    write_snapshots(&poller, output);
    log::info!("Spectra written to {}", output.display());
}

fn load_channel_config(args: &ArgMatches) -> Option<ChannelConfig> {
    let channel = *args.get_one::<usize>("channel").unwrap_or(&0);
    let Some(config_path) = args.get_one::<String>("path") else {
        return Some(ChannelConfig::default());
    };
    let config = match Config::read_config_file(Path::new(config_path)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return None;
        }
    };
    match config.channel(channel) {
        Ok(c) => Some(c.clone()),
        Err(e) => {
            log::error!("{e}");
            None
        }
    }
}

fn convert(args: &ArgMatches) {
    let Some(input) = args.get_one::<String>("input") else {
        return;
    };
    let Some(output) = args.get_one::<String>("output") else {
        return;
    };
    let Some(channel_config) = load_channel_config(args) else {
        return;
    };
    log::info!("Converting {input}...");
    match convert_file(Path::new(input), &channel_config)
        .and_then(|run| run.write_yaml(Path::new(output)).map(|_| run))
    {
        Ok(run) => log::info!(
            "Converted {} frames and {} real events to {output}",
            run.summary.frames,
            run.summary.real_events
        ),
        Err(e) => log::error!("Conversion failed with error: {e}"),
    }
}

fn dump(args: &ArgMatches) {
    let Some(input) = args.get_one::<String>("input") else {
        return;
    };
    let mut file = match File::open(input) {
        Ok(f) => f,
        Err(e) => {
            log::error!("Could not open {input}: {e}");
            return;
        }
    };
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match dump_records(&mut file, &mut out) {
        Ok(n) => {
            let _ = out.flush();
            log::info!("Dumped {n} records.");
        }
        Err(e) => log::error!("Dump failed with error: {e}"),
    }
}

fn main() {
    // Create a cli
    let path_arg = Arg::new("path")
        .short('p')
        .long("path")
        .help("Path to the configuration file");
    let matches = Command::new("mca_listmode_cli")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(path_arg.clone().required(true)),
        )
        .subcommand(
            Command::new("watch")
                .about("Tail the list files of every configured channel")
                .arg(path_arg.clone().required(true))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value("spectra.yml")
                        .help("Where to write the spectra and counters"),
                )
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_parser(clap::value_parser!(u64))
                        .help("Stop after this many seconds"),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert a complete list file to an event table and spectra")
                .arg(Arg::new("input").required(true).help("List file"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true)
                        .help("Output yaml file"),
                )
                .arg(path_arg.clone())
                .arg(
                    Arg::new("channel")
                        .short('c')
                        .long("channel")
                        .value_parser(clap::value_parser!(usize))
                        .help("Channel of the configuration to use"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Print every record of a list file")
                .arg(Arg::new("input").required(true).help("List file")),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    if let Err(e) = init_library_log() {
        log::warn!("Could not create library log file {LIBRARY_LOG}: {e}");
    }

    match matches.subcommand() {
        Some(("new", args)) => {
            let config_path =
                PathBuf::from(args.get_one::<String>("path").expect("We require args"));
            log::info!(
                "Making a template config at {}...",
                config_path.to_string_lossy()
            );
            make_template_config(&config_path);
            log::info!("Done.");
        }
        Some(("watch", args)) => {
            let config_path =
                PathBuf::from(args.get_one::<String>("path").expect("We require args"));
            let output = PathBuf::from(args.get_one::<String>("output").expect("Has default"));
            let seconds = args.get_one::<u64>("seconds").copied();

            // Load our config
            log::info!("Loading config from {}...", config_path.to_string_lossy());
            let config = match Config::read_config_file(&config_path) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("{e}");
                    return;
                }
            };
            log::info!("Config successfully loaded.");
            for (id, channel) in config.channels.iter().enumerate() {
                match &channel.list_file {
                    Some(path) => log::info!("Channel {id}: {}", path.to_string_lossy()),
                    None => log::info!("Channel {id}: streaming disabled"),
                }
            }
            watch(config, &output, seconds, &pb_manager);
            log::info!("Done.");
        }
        Some(("convert", args)) => {
            convert(args);
            log::info!("Done.");
        }
        Some(("dump", args)) => dump(args),
        _ => (),
    }
}
