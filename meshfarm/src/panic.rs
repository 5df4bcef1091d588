//! Panic handler for engine cleanup and state logging.
//!
//! Engine processes run in their own process groups, so they would outlive a
//! crashed meshfarm. The hook installed by [`init`]:
//!
//! - Logs the panic location and message
//! - Logs job totals, when a callback is registered
//! - Kills every registered engine process group
//! - Chains to the original panic hook
//!
//! Panic hooks must be `'static`, so live engines are tracked in a global
//! registry. [`ProcessEngine`](crate::engine::ProcessEngine) registers its
//! group on spawn and unregisters it when dropped.

use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::sync::{Mutex, OnceLock};

use crate::jobs::JobCounts;

/// Global engine registry for panic cleanup.
static ENGINE_REGISTRY: OnceLock<Mutex<EngineRegistry>> = OnceLock::new();

/// Live engine process groups and state callbacks.
#[derive(Default)]
struct EngineRegistry {
    /// Process groups to kill on panic.
    groups: Vec<i32>,
    /// Callback to capture job totals.
    jobs_callback: Option<Box<dyn Fn() -> JobCounts + Send + Sync>>,
}

fn registry() -> &'static Mutex<EngineRegistry> {
    ENGINE_REGISTRY.get_or_init(|| Mutex::new(EngineRegistry::default()))
}

/// Installs the panic hook.
///
/// Call once early in startup; the original hook still runs afterwards.
pub fn init() {
    let _ = registry();

    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        handle_panic(info);
        original_hook(info);
    }));
}

/// Registers an engine process group for panic cleanup.
pub fn register_engine_group(pgid: i32) {
    if let Ok(mut guard) = registry().lock() {
        guard.groups.push(pgid);
    }
}

/// Unregisters a process group after its engine stopped normally.
pub fn unregister_engine_group(pgid: i32) {
    if let Ok(mut guard) = registry().lock() {
        guard.groups.retain(|g| *g != pgid);
    }
}

/// Sets the callback used to log job totals on panic.
pub fn set_jobs_callback<F>(callback: F)
where
    F: Fn() -> JobCounts + Send + Sync + 'static,
{
    if let Ok(mut guard) = registry().lock() {
        guard.jobs_callback = Some(Box::new(callback));
    }
}

fn handle_panic(info: &PanicHookInfo<'_>) {
    // Logging may be broken, write to stderr directly.
    let mut stderr = std::io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "━━━ meshfarm panic ━━━");
    if let Some(location) = info.location() {
        let _ = writeln!(
            stderr,
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    if let Some(message) = info.payload().downcast_ref::<&str>() {
        let _ = writeln!(stderr, "Message: {}", message);
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        let _ = writeln!(stderr, "Message: {}", message);
    }

    // try_lock: the panicking thread may already hold the registry.
    let Some(Ok(guard)) = ENGINE_REGISTRY.get().map(|r| r.try_lock()) else {
        let _ = writeln!(stderr, "Engine registry unavailable, skipping cleanup.");
        let _ = stderr.flush();
        return;
    };

    if let Some(ref callback) = guard.jobs_callback {
        let counts = callback();
        let _ = writeln!(stderr, "Jobs queued:      {}", counts.queued);
        let _ = writeln!(stderr, "Jobs running:     {}", counts.running);
        let _ = writeln!(stderr, "Jobs succeeded:   {}", counts.succeeded);
        let _ = writeln!(stderr, "Jobs failed:      {}", counts.failed);
        let _ = writeln!(stderr, "Jobs timed out:   {}", counts.timed_out);
    }

    if guard.groups.is_empty() {
        let _ = writeln!(stderr, "No engine processes to clean up.");
    } else {
        let _ = writeln!(
            stderr,
            "Killing {} engine process group(s)...",
            guard.groups.len()
        );
        for pgid in &guard.groups {
            let _ = writeln!(stderr, "  pgid {}", pgid);
            crate::engine::kill_process_group(*pgid);
        }
    }

    let _ = writeln!(stderr, "━━━━━━━━━━━━━━━━━━━━━━");
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> Vec<i32> {
        registry().lock().unwrap().groups.clone()
    }

    #[test]
    fn test_engine_registry_register_unregister() {
        // Fake group ids far above any real pid range.
        register_engine_group(i32::MAX - 1);
        register_engine_group(i32::MAX - 2);
        assert!(registered().contains(&(i32::MAX - 1)));
        assert!(registered().contains(&(i32::MAX - 2)));

        unregister_engine_group(i32::MAX - 1);
        assert!(!registered().contains(&(i32::MAX - 1)));
        assert!(registered().contains(&(i32::MAX - 2)));
        unregister_engine_group(i32::MAX - 2);
    }
}
