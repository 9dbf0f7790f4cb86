//! Passive-check dispatch.
//!
//! Every crawled response is handed to the registered `ResponseModule`s as one
//! `ResponseDispatchTask`. The `ResponseDispatcher` runs these tasks on a
//! bounded pool of blocking workers, since response modules are synchronous
//! and typically regex-heavy.

use crate::error::ScanError;
use crate::http::{Request, Response};
use crate::module::ResponseModule;
use crate::stats::ScanStats;
use crate::workspace::Workspace;
use kanal::{AsyncReceiver, AsyncSender};
use log::{error, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// One crawled response bound to the modules that should inspect it.
pub struct ResponseDispatchTask {
    pub scan_id: u64,
    pub request: Arc<Request>,
    pub response: Arc<Response>,
    pub workspace: Workspace,
    pub modules: Arc<Vec<Arc<dyn ResponseModule>>>,
}

impl ResponseDispatchTask {
    /// Runs the modules in order. The first error stops the remaining modules.
    pub fn run(&self) -> Result<(), ScanError> {
        for module in self.modules.iter() {
            trace!(
                "Running response module '{}' on {}",
                module.name(),
                self.request.url
            );
            module.process_response(self.scan_id, &self.request, &self.response, &self.workspace)?;
        }
        Ok(())
    }
}

/// Decrements the in-flight counter once a dispatch task has finished.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Worker pool executing `ResponseDispatchTask`s.
///
/// The queue is bounded by `capacity`; `dispatch` waits for room when it is full.
pub struct ResponseDispatcher {
    task_tx: AsyncSender<ResponseDispatchTask>,
    in_flight: Arc<AtomicUsize>,
}

impl ResponseDispatcher {
    /// Spawns the dispatch worker. Must be called from within a tokio runtime.
    pub fn spawn(workers: usize, capacity: usize, stats: Arc<ScanStats>) -> Self {
        let (task_tx, task_rx) = kanal::bounded_async::<ResponseDispatchTask>(capacity);
        let in_flight = Arc::new(AtomicUsize::new(0));
        spawn_dispatch_worker(task_rx, Arc::clone(&in_flight), workers.max(1), stats);
        ResponseDispatcher { task_tx, in_flight }
    }

    pub async fn dispatch(&self, task: ResponseDispatchTask) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.task_tx.send(task).await {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            error!("Dispatch channel closed, dropping response task: {}", e);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}

fn spawn_dispatch_worker(
    task_rx: AsyncReceiver<ResponseDispatchTask>,
    in_flight: Arc<AtomicUsize>,
    workers: usize,
    stats: Arc<ScanStats>,
) -> tokio::task::JoinHandle<()> {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    tokio::spawn(async move {
        trace!("Starting response dispatcher with {} workers", workers);
        while let Ok(task) = task_rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("Semaphore closed, shutting down response dispatcher.");
                    break;
                }
            };

            let guard = InFlightGuard(Arc::clone(&in_flight));
            let stats_clone = Arc::clone(&stats);

            tasks.spawn_blocking(move || {
                let _guard = guard;
                let start_time = Instant::now();
                stats_clone.increment_dispatch_tasks_run();
                match task.run() {
                    Ok(()) => trace!(
                        "Response modules finished for {} in {:?}",
                        task.request.url,
                        start_time.elapsed()
                    ),
                    Err(e) => {
                        stats_clone.increment_dispatch_tasks_failed();
                        error!("Response module failed for {}: {}", task.request.url, e);
                    }
                }
                drop(permit);
            });

            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("A response dispatch task failed: {:?}", e);
                }
            }
        }

        trace!("Waiting for active response dispatch tasks to complete");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("A response dispatch task failed: {:?}", e);
            }
        }
        trace!("Response dispatcher finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::InMemoryAlertStore;
    use crate::diagnostics::RecordingSink;
    use crate::request_log::InMemoryRequestLog;
    use parking_lot::Mutex;
    use std::time::Duration;
    use url::Url;

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl ResponseModule for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn process_response(
            &self,
            _scan_id: u64,
            _request: &Request,
            _response: &Response,
            _workspace: &Workspace,
        ) -> Result<(), ScanError> {
            self.seen.lock().push(self.name);
            if self.fail {
                return Err(ScanError::module(self.name, "boom"));
            }
            Ok(())
        }
    }

    fn task(modules: Vec<Arc<dyn ResponseModule>>, stats: Arc<ScanStats>) -> ResponseDispatchTask {
        let url = Url::parse("http://example.com/").unwrap();
        ResponseDispatchTask {
            scan_id: 1,
            request: Arc::new(Request::get(url.clone())),
            response: Arc::new(Response::new(url, 200, "ok")),
            workspace: Workspace::new(
                Arc::new(InMemoryAlertStore::new()),
                Arc::new(InMemoryRequestLog::new()),
                Arc::new(RecordingSink::new()),
                stats,
            ),
            modules: Arc::new(modules),
        }
    }

    #[test]
    fn test_failing_module_stops_the_rest() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let modules: Vec<Arc<dyn ResponseModule>> = vec![
            Arc::new(Recorder { name: "a", seen: seen.clone(), fail: false }),
            Arc::new(Recorder { name: "b", seen: seen.clone(), fail: true }),
            Arc::new(Recorder { name: "c", seen: seen.clone(), fail: false }),
        ];

        let result = task(modules, Arc::new(ScanStats::new())).run();

        assert!(matches!(result, Err(ScanError::Module { .. })));
        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_dispatcher_runs_tasks_and_goes_idle() {
        let stats = Arc::new(ScanStats::new());
        let dispatcher = ResponseDispatcher::spawn(2, 1, Arc::clone(&stats));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let modules: Vec<Arc<dyn ResponseModule>> =
                vec![Arc::new(Recorder { name: "a", seen: seen.clone(), fail: false })];
            dispatcher.dispatch(task(modules, Arc::clone(&stats))).await;
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while !dispatcher.is_idle() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(seen.lock().len(), 3);
        assert_eq!(stats.dispatch_tasks_run.load(Ordering::SeqCst), 3);
        assert_eq!(stats.dispatch_tasks_failed.load(Ordering::SeqCst), 0);
    }
}
