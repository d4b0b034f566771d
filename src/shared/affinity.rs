/// Dedicated-thread helpers
///
/// Engine stages run on named OS threads, optionally pinned to a core to
/// bound scheduling jitter. Pinning needs the `cpu-affinity` feature; without
/// it the request is logged and ignored.

use crate::shared::error::EngineError;
use std::thread::{self, JoinHandle};

/// Pins the calling thread to `core` (index into the platform's core list)
pub fn pin_current_thread(core: Option<usize>) {
    let Some(core) = core else {
        return;
    };

    #[cfg(feature = "cpu-affinity")]
    {
        match core_affinity::get_core_ids() {
            Some(core_ids) if core < core_ids.len() => {
                if core_affinity::set_for_current(core_ids[core]) {
                    tracing::info!(core, "thread pinned");
                } else {
                    tracing::warn!(core, "failed to pin thread");
                }
            }
            _ => tracing::warn!(core, cores = num_cpus::get(), "core index out of range, not pinning"),
        }
    }

    #[cfg(not(feature = "cpu-affinity"))]
    tracing::debug!(core, "cpu-affinity feature disabled, not pinning");
}

/// Spawns a named thread, pinning it first if requested
pub fn spawn_pinned<F, T>(name: &str, core: Option<usize>, body: F) -> Result<JoinHandle<T>, EngineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            pin_current_thread(core);
            body()
        })
        .map_err(|e| EngineError::ThreadSpawn {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_pinned_runs_body() {
        let handle = spawn_pinned("test-worker", None, || 7).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn test_thread_is_named() {
        let handle = spawn_pinned("named-worker", Some(0), || {
            thread::current().name().map(str::to_string)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("named-worker"));
    }
}
