mod options;

use std::{io::Write, process::ExitCode, time::Instant};

use clap::Parser;
use log::{error, info, LevelFilter};
use options::Options;
use spf_parser::{Error, SpfParser};

/// Initializes logging with a timestamped single-line format on stderr.
///
/// # Arguments
/// * `filter` - The minimum log level to be logged.
fn initialize_logging(filter: LevelFilter) {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} [{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .filter_level(filter)
        .init();
}

/// Runs the validation pass over the input file.
fn run_program(options: &Options) -> spf_parser::Result<()> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Git hash: {}", env!("GIT_HASH"));

    info!("Options:");
    options.dump_to_log();
    info!("-------");

    let parser = SpfParser {
        with_progress: options.progress,
        with_tree: false,
        only_header: options.only_header,
        fail_fast: options.only_header,
    };

    let t = Instant::now();
    parser.parse_file(&options.input_file)?;
    info!("Validated in {} ms", t.elapsed().as_millis());

    Ok(())
}

fn main() -> ExitCode {
    // clap exits with code 2 itself on conflicting or malformed flags
    let options = Options::parse();
    initialize_logging(LevelFilter::from(options.log_level));

    match run_program(&options) {
        Ok(()) => {
            if !options.json {
                eprintln!("Valid");
            }
            ExitCode::SUCCESS
        }
        Err(Error::Validation(errors)) => {
            if options.json {
                println!("{}", errors.to_json(true));
            } else {
                eprintln!("{}", errors);
            }
            ExitCode::from(1)
        }
        Err(err) => {
            error!("Error: {}", err);
            eprintln!("{}", err);
            ExitCode::from(1)
        }
    }
}
