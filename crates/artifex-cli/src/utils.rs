use std::{
    fmt::Display,
    sync::{LazyLock, RwLock},
};

use artifex_config::config::Config;
use artifex_dl::http_client::{ClientConfig, HttpClient};
use nu_ansi_term::Color;
use ureq::{
    http::{HeaderMap, HeaderName, HeaderValue},
    Proxy,
};

use crate::{
    cli::Args,
    error::{CliError, CliResult},
};

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static PROGRESS: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

fn read_flag(flag: &RwLock<bool>) -> bool {
    flag.read().map(|v| *v).unwrap_or(true)
}

pub fn set_flag(flag: &RwLock<bool>, value: bool) {
    if let Ok(mut guard) = flag.write() {
        *guard = value;
    }
}

pub fn progress_enabled() -> bool {
    read_flag(&PROGRESS)
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if read_flag(&COLOR) {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Splits `Name: value` into a header pair.
pub fn parse_header(header: &str) -> CliResult<(HeaderName, HeaderValue)> {
    let invalid = || CliError::InvalidHeader(header.to_string());

    let (name, value) = header.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}

/// Builds the HTTP client from the config, with command line flags taking precedence.
pub fn build_http_client(args: &Args, config: &Config) -> CliResult<HttpClient> {
    let mut client_config = ClientConfig::default();

    if let Some(user_agent) = args.user_agent.as_ref().or(config.user_agent.as_ref()) {
        client_config.user_agent = Some(user_agent.clone());
    }

    if let Some(proxy) = args.proxy.as_ref().or(config.proxy.as_ref()) {
        let proxy = Proxy::new(proxy).map_err(|err| {
            CliError::InvalidProxy {
                url: proxy.clone(),
                source: err,
            }
        })?;
        client_config.proxy = Some(proxy);
    }

    client_config.timeout = Some(config.get_timeout()?);

    let mut headers = HeaderMap::new();
    for (name, value) in config.headers.iter().flatten() {
        let (name, value) = parse_header(&format!("{name}: {value}"))?;
        headers.insert(name, value);
    }
    for header in args.header.iter().flatten() {
        let (name, value) = parse_header(header)?;
        headers.insert(name, value);
    }
    if !headers.is_empty() {
        client_config.headers = Some(headers);
    }

    Ok(client_config.build())
}
