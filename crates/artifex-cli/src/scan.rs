use artifex_dl::{error::DownloadError, scan::HubScanner};
use nu_ansi_term::Color::{Green, Red, Yellow};
use tracing::{error, info, warn};

use crate::{
    error::{CliError, CliResult},
    progress::create_spinner_job,
    utils::Colored,
};

/// Scans each identifier and reports the verdicts. Unsafe or unreachable repositories make
/// the whole run fail after every identifier has been checked.
pub fn scan_repositories(scanner: &HubScanner, identifiers: &[String]) -> CliResult<()> {
    let total = identifiers.len();
    let mut failed = 0;

    for identifier in identifiers {
        let spinner = create_spinner_job(&format!("Scanning {identifier}"));
        let result = scanner.scan(identifier);
        spinner.finish_and_clear();

        match result {
            Ok(result) => {
                let status = if result.scans_done {
                    Colored(Green, "clean")
                } else {
                    Colored(Yellow, "not fully scanned")
                };
                info!(
                    "{} {} (revision {})",
                    identifier,
                    status,
                    if result.revision.is_empty() {
                        "unknown"
                    } else {
                        result.revision.as_str()
                    }
                );
            }
            Err(DownloadError::UnsafeFiles { result }) => {
                warn!("{} {}", identifier, Colored(Red, "has unsafe files"));
                for file in &result.clamav_infected_files {
                    warn!("  infected: {}", file);
                }
                for file in &result.dangerous_pickles {
                    warn!("  dangerous pickle: {}", file);
                }
                failed += 1;
            }
            Err(err) => {
                error!("{} {}: {}", Colored(Red, "Failed"), identifier, err);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::BatchFailed { failed, total });
    }
    Ok(())
}
