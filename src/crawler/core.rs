//! The tokio-backed crawler used by default.
//!
//! `AsyncCrawler` receives `CrawlTask`s over an unbounded channel, so that
//! `submit` never blocks the check module calling it. A single worker task
//! pulls tasks off the channel and spawns one download per task, bounded by a
//! semaphore of `max_concurrent_requests` permits. When the download finishes
//! the task's callback runs on that same tokio task, with the task's context.

use super::{CrawlTask, Crawler, Downloader};
use crate::stats::ScanStats;
use kanal::{AsyncReceiver, Sender};
use log::{debug, error, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Decrements the pending counter when a task completes, even if its callback panics.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Crawler that downloads probe requests on tokio tasks.
pub struct AsyncCrawler {
    task_tx: Sender<CrawlTask>,
    pending: Arc<AtomicUsize>,
}

impl AsyncCrawler {
    /// Spawns the crawler worker. Must be called from within a tokio runtime.
    pub fn spawn(
        downloader: Arc<dyn Downloader>,
        max_concurrent_requests: usize,
        stats: Arc<ScanStats>,
    ) -> Arc<Self> {
        let (task_tx, task_rx) = kanal::unbounded::<CrawlTask>();
        let pending = Arc::new(AtomicUsize::new(0));

        spawn_crawl_worker(
            task_rx.to_async(),
            downloader,
            Arc::clone(&pending),
            max_concurrent_requests,
            stats,
        );

        Arc::new(AsyncCrawler { task_tx, pending })
    }

}

impl Crawler for AsyncCrawler {
    fn submit(&self, task: CrawlTask) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        trace!(
            "Submitting probe {} for index {:?}",
            task.request.url,
            task.context.current_index()
        );
        if let Err(e) = self.task_tx.send(task) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            error!("Crawl task channel closed, dropping probe request: {}", e);
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }
}

fn spawn_crawl_worker(
    task_rx: AsyncReceiver<CrawlTask>,
    downloader: Arc<dyn Downloader>,
    pending: Arc<AtomicUsize>,
    max_concurrent_requests: usize,
    stats: Arc<ScanStats>,
) -> tokio::task::JoinHandle<()> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_requests));
    let mut tasks = JoinSet::new();

    tokio::spawn(async move {
        trace!(
            "Crawl worker started with max_concurrent_requests: {}",
            max_concurrent_requests
        );
        while let Ok(task) = task_rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("Semaphore closed, shutting down crawl worker.");
                    break;
                }
            };

            let pending_guard = PendingGuard(Arc::clone(&pending));
            let downloader_clone = Arc::clone(&downloader);
            let stats_clone = Arc::clone(&stats);

            tasks.spawn(async move {
                let _pending = pending_guard;
                let CrawlTask {
                    request,
                    callback,
                    context,
                } = task;
                let start_time = Instant::now();

                match downloader_clone.download(request.clone()).await {
                    Ok(response) => {
                        trace!(
                            "Download successful for URL: {}, took {:?}",
                            response.url,
                            start_time.elapsed()
                        );
                        stats_clone.record_response(response.status);
                        callback.process_response(&request, &response, &context);
                    }
                    Err(e) => {
                        debug!("Download error for URL {}: {}", request.url, e);
                        stats_clone.increment_downloads_failed();
                        callback.process_exception(&request, &e, &context);
                    }
                }
                drop(permit);
            });

            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("A crawl task failed: {:?}", e);
                }
            }
        }

        trace!("Waiting for active crawl tasks to complete");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("A crawl task failed: {:?}", e);
            }
        }
        trace!("Crawl worker finished");
    })
}
