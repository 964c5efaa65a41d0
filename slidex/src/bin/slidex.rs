use std::{ffi::OsString, path::PathBuf, time::Instant};

use clap::Parser;
use color_eyre::eyre::{self, Context};
use slidex::{
    pipeline::{self, RunOptions, SourceDescriptor},
    transfer::{Locator, CHUNK_SIZE},
    Error,
};
use slidex_common::{
    bin_common::{
        args::sampling::SamplingCli,
        init::{init_eyre, init_logger},
        termination,
    },
    utils::fsutils::read_optional_file,
};

#[derive(Parser, Debug)]
#[command()]
/// Extracts the slides of a recorded presentation.
///
/// The video is sampled once every stride, and a frame is saved as a new slide whenever
/// it differs enough from the previous slide. The slides are then merged into one PDF.
struct Cli {
    #[command(flatten)]
    sampling: SamplingCli,

    /// Where the video is, an http(s) URL or a local path
    #[arg(long, short = 'u')]
    url: String,

    /// Where to put the downloaded video, the slides and the document [default: the
    /// current directory]
    #[arg(long, short = 'd')]
    dir: Option<PathBuf>,

    /// Base name of the downloaded video, the slides and the document
    #[arg(long, short = 'n', default_value = "temp", value_parser = base_name_parser)]
    name: String,

    /// Remove the downloaded video when done
    #[arg(long, short = 'r')]
    remove: bool,

    /// Only save the slides, don't merge them into a PDF
    #[arg(long)]
    no_merge: bool,

    /// Log debug messages
    #[arg(long, short = 'v')]
    verbose: bool,

    /// A file to additionally write the logs to
    #[arg(long)]
    logfile: Option<PathBuf>,
}

fn base_name_parser(s: &str) -> Result<String, String> {
    if s.is_empty() || s.contains(std::path::is_separator) || s == "." || s == ".." {
        Err("must be a plain file name".to_string())
    } else {
        Ok(s.to_string())
    }
}

fn cli_arguments() -> eyre::Result<Cli> {
    const ARGS_FILE: &str = ".slidexrc";
    let mut args: Vec<OsString> = std::env::args_os().collect();

    if args.len() == 1 {
        if let Some(flags) = read_optional_file(ARGS_FILE)
            .wrap_err_with(|| format!("Could not read config file at: {ARGS_FILE}"))?
        {
            args.extend(
                flags
                    .split_whitespace()
                    .map(|s| std::ffi::OsStr::new(s).to_owned()),
            );
        }
    }

    Ok(Cli::parse_from(args))
}

fn main() -> eyre::Result<()> {
    init_eyre()?;
    let cli = cli_arguments()?;
    init_logger(cli.logfile.as_deref(), cli.verbose)?;

    log::debug!("CLI arguments: {cli:#?}");

    let term_cookie =
        termination::Cookie::new().wrap_err("failed to create term cookie")?;

    let dest_dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().wrap_err("failed to get the current dir")?,
    };
    let source = SourceDescriptor {
        locator: Locator::parse(&cli.url).wrap_err("invalid url")?,
        dest_dir,
        base_name: cli.name,
    };
    let opts = RunOptions {
        sampling: cli.sampling.to_args(),
        remove_source: cli.remove,
        merge: !cli.no_merge,
        chunk_size: CHUNK_SIZE,
    };

    let before = Instant::now();
    match pipeline::run(&source, &opts, &term_cookie) {
        Ok(outcome) => {
            log::info!(
                "Extracted {} slides in {}",
                outcome.slides,
                humantime::Duration::from(before.elapsed())
            );
            if let Some(document) = outcome.document {
                log::info!("The slides are in {}", document.display());
            }
            Ok(())
        }
        Err(Error::Interrupted) => {
            log::warn!("Interrupted, stopped cleanly");
            Ok(())
        }
        Err(e) => Err(e)
            .wrap_err_with(|| format!("failed to extract slides from '{}'", source.locator)),
    }
}
