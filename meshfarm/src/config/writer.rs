//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let catalog_path = config
        .catalog
        .path
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();

    format!(
        r#"[engine]
; How the authoring engine is provisioned for builds:
;   isolated  - a fresh engine process per build, killed on timeout (default)
;   shared    - one persistent engine; builds run one at a time in order
;   simulated - in-process stand-in engine for dry runs
mode = {}
; Engine executable and its arguments (whitespace separated).
; The engine speaks the JSON-lines bridge protocol on stdin/stdout.
command = {}
args = {}
; Deadline in seconds for one build on the engine (default: 110)
timeout = {}

[scheduler]
; Builds running at once (default: 5)
concurrency = {}
; Attempts per build, including the first (default: 1 = no retry)
; Timed-out builds are never retried.
max_attempts = {}

[optimizer]
; Accepted deviation from a tier's triangle target, as a fraction (default: 0.15)
tolerance = {}

[output]
; Root directory for exported assets; one subdirectory per catalog entry
directory = {}

[server]
; Job server listen address (default: 127.0.0.1:9876)
bind = {}
port = {}
; Request deadlines in seconds, each between 30 and 120
; build_single (default: 120)
build_timeout = {}
; build_all (default: 120)
batch_timeout = {}
; job_status, health_check, list_entries (default: 30)
status_timeout = {}

[catalog]
; JSON catalog file replacing the built-in catalog (empty = built-in)
path = {}

[logging]
; Log file, cleared at the start of each session
file = {}
"#,
        config.engine.mode,
        config.engine.command,
        config.engine.args.join(" "),
        config.engine.timeout.as_secs(),
        config.scheduler.concurrency,
        config.scheduler.max_attempts,
        config.optimizer.tolerance,
        path_to_string(&config.output.directory),
        config.server.bind,
        config.server.port,
        config.server.build_timeout.as_secs(),
        config.server.batch_timeout.as_secs(),
        config.server.status_timeout.as_secs(),
        catalog_path,
        path_to_string(&config.logging.file),
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
