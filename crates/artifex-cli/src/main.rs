use std::{fs, path::PathBuf};

use artifex_config::config::{
    self, config_path, generate_default_config, get_config, set_config_path, Config,
};
use artifex_dl::scan::HubScanner;
use artifex_utils::path::resolve_path;
use clap::Parser;
use cli::{Args, Commands};
use download::{download, DownloadContext};
use error::{CliError, CliResult};
use fetch::{cat_artifact, cat_base64_image, resolve_identifiers};
use logging::setup_logging;
use scan::scan_repositories;
use tracing::{info, warn};
use utils::{build_http_client, set_flag, COLOR, PROGRESS};

mod cli;
mod download;
mod error;
mod fetch;
mod logging;
mod progress;
mod scan;
mod utils;

/// `--trusted-root` wins over the config file.
fn trusted_root(flag: Option<&str>, config: &Config) -> CliResult<Option<PathBuf>> {
    match flag {
        Some(root) => Ok(Some(resolve_path(root)?)),
        None => Ok(config.get_trusted_root()?),
    }
}

/// Prints the config file, or the defaults when there is none yet.
fn show_config() -> CliResult<()> {
    let config_path = config_path();
    let content = match fs::read_to_string(&config_path) {
        Ok(v) => v,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found", config_path.display());
            toml::to_string_pretty(&Config::default_config())?
        }
        Err(err) => {
            return Err(CliError::IoError {
                action: format!("reading {}", config_path.display()),
                source: err,
            });
        }
    };
    info!("{}", content);
    Ok(())
}

fn handle_cli() -> CliResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        set_flag(&COLOR, false);
    }

    if args.no_progress || args.quiet || args.json {
        set_flag(&PROGRESS, false);
    }

    if let Some(ref c) = args.config {
        set_config_path(resolve_path(c)?);
    }

    match &args.command {
        Commands::DefConfig => {
            generate_default_config()?;
            return Ok(());
        }
        Commands::Config => return show_config(),
        Commands::Resolve {
            identifiers,
        } => {
            let mut stdout = std::io::stdout().lock();
            return resolve_identifiers(identifiers, args.json, &mut stdout);
        }
        _ => {}
    }

    config::init()?;
    let config = get_config();
    let client = build_http_client(&args, &config)?;

    match args.command {
        Commands::Get {
            identifiers,
            output,
            checksum,
            no_extract,
            scan,
            trusted_root: root,
        } => {
            let context = DownloadContext {
                trusted_root: trusted_root(root.as_deref(), &config)?,
                extract: !no_extract && config.extract_archives(),
                scan: scan || config.scan_before_download(),
                client,
                config,
                output,
                checksum,
            };
            download(&context, &identifiers)?;
        }
        Commands::Cat {
            identifier,
            trusted_root: root,
            base64,
        } => {
            let mut stdout = std::io::stdout().lock();
            if base64 {
                cat_base64_image(&client, &identifier, &mut stdout)?;
            } else {
                let root = trusted_root(root.as_deref(), &config)?;
                cat_artifact(&client, &identifier, root.as_deref(), &mut stdout)?;
            }
        }
        Commands::Scan {
            identifiers,
        } => {
            let scanner = HubScanner::new(client).api(config.hub_api());
            scan_repositories(&scanner, &identifiers)?;
        }
        Commands::DefConfig | Commands::Config | Commands::Resolve { .. } => {}
    }

    progress::stop();
    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        progress::stop();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
