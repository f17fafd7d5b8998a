//! Background commit task.

use super::StorageEngine;
use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

type StopSignal = Arc<(Mutex<bool>, Condvar)>;

/// Commits an engine at a fixed interval on a dedicated thread.
///
/// [`stop`](Self::stop) raises the stop flag, wakes the thread and joins it,
/// so no commit from this task can start after `stop` returns.
#[derive(Debug)]
pub(crate) struct AutoCommit {
    signal: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl AutoCommit {
    pub(crate) fn start(engine: Arc<dyn StorageEngine>, interval: Duration) -> CoreResult<Self> {
        let signal: StopSignal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("tessera-autocommit".to_string())
            .spawn(move || run(&*engine, &thread_signal, interval))?;
        debug!(interval_secs = interval.as_secs(), "autocommit started");
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Signals the task to finish and waits for it.
    pub(crate) fn stop(mut self) -> CoreResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CoreResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        {
            let (stopped, wake) = &*self.signal;
            *stopped.lock() = true;
            wake.notify_all();
        }
        handle
            .join()
            .map_err(|_| CoreError::illegal_state("autocommit task panicked"))?;
        debug!("autocommit stopped");
        Ok(())
    }
}

impl Drop for AutoCommit {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "autocommit did not stop cleanly");
        }
    }
}

fn run(engine: &dyn StorageEngine, signal: &StopSignal, interval: Duration) {
    let (stopped, wake) = &**signal;
    let mut guard = stopped.lock();
    while !*guard {
        let timed_out = wake.wait_for(&mut guard, interval).timed_out();
        if *guard {
            break;
        }
        if timed_out {
            MutexGuard::unlocked(&mut guard, || {
                if let Err(e) = engine.commit() {
                    warn!(error = %e, engine = %engine.kind(), "autocommit failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BackendMap, MemoryEngine};
    use crate::config::EngineKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingEngine {
        inner: MemoryEngine,
        commits: AtomicUsize,
    }

    impl StorageEngine for CountingEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Memory
        }
        fn open(&self) -> CoreResult<()> {
            Ok(())
        }
        fn open_map(&self, name: &str) -> CoreResult<Arc<dyn BackendMap>> {
            self.inner.open_map(name)
        }
        fn has_map(&self, name: &str) -> bool {
            self.inner.has_map(name)
        }
        fn map_names(&self) -> Vec<String> {
            self.inner.map_names()
        }
        fn drop_map(&self, name: &str) -> CoreResult<()> {
            self.inner.drop_map(name)
        }
        fn commit(&self) -> CoreResult<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn close(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn commits_periodically_until_stopped() {
        let engine = Arc::new(CountingEngine::default());
        let task = AutoCommit::start(
            Arc::clone(&engine) as Arc<dyn StorageEngine>,
            Duration::from_millis(10),
        )
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.commits.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        task.stop().unwrap();

        let after_stop = engine.commits.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(engine.commits.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn stop_does_not_wait_for_the_interval() {
        let engine = Arc::new(CountingEngine::default());
        let task = AutoCommit::start(engine as Arc<dyn StorageEngine>, Duration::from_secs(3600))
            .unwrap();
        let started = std::time::Instant::now();
        task.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
