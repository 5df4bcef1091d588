//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::engine::EngineMode;
use crate::server::{MAX_REQUEST_TIMEOUT, MIN_REQUEST_TIMEOUT};

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses a number that must be at least `min`.
fn parse_at_least<T>(
    props: &Properties,
    section: &str,
    key: &str,
    min: T,
    reason: &str,
) -> Result<Option<T>, ConfigFileError>
where
    T: FromStr + PartialOrd,
{
    let Some(v) = props.get(key) else {
        return Ok(None);
    };
    match v.trim().parse::<T>() {
        Ok(n) if n >= min => Ok(Some(n)),
        _ => Err(invalid(section, key, v, reason)),
    }
}

/// Parses a whole number of seconds, at least one.
fn parse_secs(
    props: &Properties,
    section: &str,
    key: &str,
) -> Result<Option<Duration>, ConfigFileError> {
    Ok(parse_at_least(
        props,
        section,
        key,
        1u64,
        "must be a positive integer (seconds)",
    )?
    .map(Duration::from_secs))
}

/// Parses a server request deadline, bounded to the accepted range.
fn parse_request_secs(
    props: &Properties,
    key: &str,
) -> Result<Option<Duration>, ConfigFileError> {
    let Some(v) = props.get(key) else {
        return Ok(None);
    };
    let range = MIN_REQUEST_TIMEOUT.as_secs()..=MAX_REQUEST_TIMEOUT.as_secs();
    match v.trim().parse::<u64>() {
        Ok(secs) if range.contains(&secs) => Ok(Some(Duration::from_secs(secs))),
        _ => Err(invalid(
            "server",
            key,
            v,
            &format!(
                "must be between {} and {} seconds",
                range.start(),
                range.end()
            ),
        )),
    }
}

/// Reads a path, treating an empty value as unset.
fn parse_path(props: &Properties, key: &str) -> Option<PathBuf> {
    props
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(expand_tilde)
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [engine] section
    if let Some(section) = ini.section(Some("engine")) {
        if let Some(v) = section.get("mode") {
            config.engine.mode = v
                .parse::<EngineMode>()
                .map_err(|_| invalid("engine", "mode", v, "must be one of: isolated, shared, simulated"))?;
        }
        if let Some(v) = section.get("command") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("engine", "command", v, "must not be empty"));
            }
            config.engine.command = v.to_string();
        }
        if let Some(v) = section.get("args") {
            config.engine.args = v
                .split_whitespace()
                .map(|arg| expand_tilde(arg).to_string_lossy().into_owned())
                .collect();
        }
        if let Some(timeout) = parse_secs(section, "engine", "timeout")? {
            config.engine.timeout = timeout;
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(n) = parse_at_least(
            section,
            "scheduler",
            "concurrency",
            1usize,
            "must be a positive integer",
        )? {
            config.scheduler.concurrency = n;
        }
        if let Some(n) = parse_at_least(
            section,
            "scheduler",
            "max_attempts",
            1u32,
            "must be a positive integer (1 = no retry)",
        )? {
            config.scheduler.max_attempts = n;
        }
    }

    // [optimizer] section
    if let Some(section) = ini.section(Some("optimizer")) {
        if let Some(v) = section.get("tolerance") {
            config.optimizer.tolerance = match v.trim().parse::<f64>() {
                Ok(t) if (0.0..1.0).contains(&t) => t,
                _ => {
                    return Err(invalid(
                        "optimizer",
                        "tolerance",
                        v,
                        "must be a fraction in [0, 1), e.g. 0.15",
                    ))
                }
            };
        }
    }

    // [output] section
    if let Some(section) = ini.section(Some("output")) {
        if let Some(dir) = parse_path(section, "directory") {
            config.output.directory = dir;
        }
    }

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("bind") {
            let v = v.trim();
            if !v.is_empty() {
                config.server.bind = v.to_string();
            }
        }
        if let Some(v) = section.get("port") {
            config.server.port = v
                .trim()
                .parse()
                .map_err(|_| invalid("server", "port", v, "must be a port number (0-65535)"))?;
        }
        if let Some(t) = parse_request_secs(section, "build_timeout")? {
            config.server.build_timeout = t;
        }
        if let Some(t) = parse_request_secs(section, "batch_timeout")? {
            config.server.batch_timeout = t;
        }
        if let Some(t) = parse_request_secs(section, "status_timeout")? {
            config.server.status_timeout = t;
        }
    }

    // [catalog] section
    if let Some(section) = ini.section(Some("catalog")) {
        config.catalog.path = parse_path(section, "path");
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(file) = parse_path(section, "file") {
            config.logging.file = file;
        }
    }

    if config.engine.timeout >= config.server.build_timeout {
        tracing::warn!(
            engine_timeout_secs = config.engine.timeout.as_secs(),
            build_timeout_secs = config.server.build_timeout.as_secs(),
            "engine.timeout is not below server.build_timeout; server responses may time out before the engine does"
        );
    }

    Ok(config)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
