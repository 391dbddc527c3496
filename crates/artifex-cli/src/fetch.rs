use std::{io::Write, path::Path};

use artifex_dl::{
    error::DownloadError,
    fetch::{fetch_and_parse, fetch_base64_image},
    http_client::HttpClient,
    uri::{looks_like_url, ArtifactUri},
    utils::default_output_name,
};
use nu_ansi_term::Color::{Blue, Cyan};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{CliResult, ErrorContext},
    utils::Colored,
};

/// Writes the artifact behind `identifier` to `out`.
///
/// Local files need a trusted root; remote bodies are written whatever the status.
pub fn cat_artifact<W: Write>(
    client: &HttpClient,
    identifier: &str,
    trusted_root: Option<&Path>,
    out: &mut W,
) -> CliResult<()> {
    let root = match (ArtifactUri::parse(identifier), trusted_root) {
        (ArtifactUri::LocalFile(path), None) => {
            return Err(DownloadError::LocalFileNotAllowed { path }.into());
        }
        (_, root) => root.unwrap_or_else(|| Path::new("")),
    };

    fetch_and_parse(client, identifier, root, |location, body| {
        out.write_all(body)
            .and_then(|_| out.flush())
            .with_context(|| format!("writing {location} to output"))
    })
}

/// Writes an image URL or data URI to `out` as one line of base64.
pub fn cat_base64_image<W: Write>(
    client: &HttpClient,
    input: &str,
    out: &mut W,
) -> CliResult<()> {
    let encoded = fetch_base64_image(client, input)?;
    writeln!(out, "{encoded}").with_context(|| "writing image to output".into())
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Resolved {
    pub identifier: String,
    pub kind: &'static str,
    pub remote: bool,
    pub location: String,
    pub file_name: Option<String>,
}

pub fn resolve_identifier(identifier: &str) -> Resolved {
    let uri = ArtifactUri::parse(identifier);
    Resolved {
        identifier: identifier.to_string(),
        kind: uri.kind(),
        remote: looks_like_url(identifier.trim()),
        location: uri.to_string(),
        file_name: default_output_name(&uri),
    }
}

/// Prints where each identifier points. With `json`, one object per line goes to `out`.
pub fn resolve_identifiers<W: Write>(
    identifiers: &[String],
    json: bool,
    out: &mut W,
) -> CliResult<()> {
    for identifier in identifiers {
        let resolved = resolve_identifier(identifier);
        if json {
            serde_json::to_writer(&mut *out, &resolved)?;
            writeln!(out).with_context(|| "writing resolved identifiers".into())?;
            continue;
        }

        if !resolved.remote && resolved.kind != "file" {
            warn!("{} has no recognised scheme, it will be fetched as a URL", identifier);
        }
        info!(
            "{} {} {}",
            Colored(Blue, format!("{:<6}", resolved.kind)),
            Colored(Cyan, &resolved.location),
            resolved.file_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
