use clap::{Arg, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libprad2_decoder::bank_scanner::dump_buffer;
use libprad2_decoder::config::Config;
use libprad2_decoder::evio_stack::EvioStack;
use libprad2_decoder::process::{create_subsets, process_subset};
use libprad2_decoder::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Print the annotated words of the first events of the first data file
fn dump_events(config: &Config, matches: &ArgMatches) {
    let n_events = matches.get_one::<usize>("n_events").copied().unwrap_or(1);
    let Some(path) = config.data_paths.first() else {
        log::error!("No data files in the configuration");
        return;
    };
    let mut stack = match EvioStack::new(path) {
        Ok(stack) => stack,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    let mut buffer = Vec::new();
    for _ in 0..n_events {
        match stack.read_event(&mut buffer) {
            Ok(true) => match dump_buffer(&buffer) {
                Ok(dump) => print!("{dump}"),
                Err(e) => log::error!("Could not dump event: {e}"),
            },
            Ok(false) => break,
            Err(e) => {
                log::error!("{e}");
                break;
            }
        }
    }
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let color = match color {
        BarColor::CYAN => "cyan",
        BarColor::RED => "red",
        BarColor::GREEN => "green",
    };
    ProgressStyle::with_template(&format!(
        "{{prefix}} [{{bar:40.{color}/blue}}] {{pos:>3}}% {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Decode every data file, one progress bar per worker
fn run_workers(config: Config, pb_manager: &MultiProgress) {
    if !config.is_n_threads_valid() {
        log::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }

    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers = Vec::new();
    let mut bars = Vec::new();
    for (idx, subset) in create_subsets(&config).into_iter().enumerate() {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let pb = pb_manager.add(ProgressBar::new(100));
        pb.set_style(bar_style(&BarColor::default()));
        pb.set_prefix(format!("Worker {idx}"));
        bars.push((idx, pb));

        let conf = config.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, tx, idx, subset)
        }));
    }
    drop(tx);

    // Receives until every worker has hung up
    for status in rx.iter() {
        if let Some((_, pb)) = bars.iter().find(|(id, _)| *id == status.worker_id) {
            pb.set_style(bar_style(&status.color));
            if let Some(path) = config.data_paths.get(status.file_number) {
                pb.set_message(path.to_string_lossy().to_string());
            }
            pb.set_position((status.progress * 100.0) as u64);
        }
    }

    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => log::info!("Worker complete"),
            Ok(Err(e)) => log::error!("Processor error: {e}"),
            Err(_) => log::error!("An error occured joining one of the workers!"),
        }
    }
    for (_, pb) in bars {
        pb.finish();
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("prad2_decoder_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("dump")
                .about("Print the annotated words of the first events of the first data file")
                .arg(
                    Arg::new("n_events")
                        .short('n')
                        .long("n-events")
                        .value_parser(clap::value_parser!(usize))
                        .help("Number of events to dump"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
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

    if LogWrapper::new(pb_manager.clone(), logger).try_init().is_err() {
        eprintln!("Could not create logging/progress!");
        return;
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required (-p <path>)");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

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

    if let Some(("dump", dump_matches)) = matches.subcommand() {
        dump_events(&config, dump_matches);
        return;
    }

    for path in config.data_paths.iter() {
        log::info!("Data Path: {}", path.to_string_lossy());
    }
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Modules: {} Events per file: {}",
        config.modules.len(),
        config.n_events
    );

    run_workers(config, &pb_manager);

    log::info!("Done.");
}
