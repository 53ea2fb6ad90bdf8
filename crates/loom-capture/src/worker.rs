// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background delivery queue.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A unit of background work.
pub type Job = BoxFuture<'static, ()>;

/// Runs jobs off the calling task.
#[async_trait::async_trait]
pub trait BackgroundWorker: Send + Sync {
	/// Submit a job. Never waits; a job that cannot be accepted is dropped.
	fn perform(&self, job: Job);

	/// Wait until every accepted job has finished. Returns false on timeout.
	async fn flush(&self, timeout: Duration) -> bool;

	/// Stop accepting jobs and wait for in-flight ones.
	async fn shutdown(&self, timeout: Duration);
}

/// Bounded tokio queue drained by a fixed number of tasks.
pub struct TokioWorker {
	tx: StdMutex<Option<mpsc::Sender<Job>>>,
	pending: Arc<AtomicUsize>,
	idle: Arc<Notify>,
	tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TokioWorker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TokioWorker")
			.field("pending", &self.pending.load(Ordering::SeqCst))
			.finish_non_exhaustive()
	}
}

impl TokioWorker {
	/// Spawns `threads` tasks on `handle` sharing a queue of `queue_size` jobs.
	pub fn spawn(handle: &Handle, threads: usize, queue_size: usize) -> Self {
		let (tx, rx) = mpsc::channel::<Job>(queue_size.max(1));
		let rx = Arc::new(Mutex::new(rx));
		let pending = Arc::new(AtomicUsize::new(0));
		let idle = Arc::new(Notify::new());

		let tasks = (0..threads.max(1))
			.map(|worker| {
				let rx = rx.clone();
				let pending = pending.clone();
				let idle = idle.clone();
				handle.spawn(async move {
					loop {
						let job = rx.lock().await.recv().await;
						let Some(job) = job else { break };

						if AssertUnwindSafe(job).catch_unwind().await.is_err() {
							error!(worker, "Background job panicked");
						}
						if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
							idle.notify_waiters();
						}
					}
					debug!(worker, "Background worker stopped");
				})
			})
			.collect();

		info!(threads = threads.max(1), queue_size, "Started background worker");

		Self {
			tx: StdMutex::new(Some(tx)),
			pending,
			idle,
			tasks: StdMutex::new(tasks),
		}
	}

	/// Number of accepted jobs that have not finished.
	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	fn sender(&self) -> Option<mpsc::Sender<Job>> {
		match self.tx.lock() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	async fn wait_idle(&self) {
		loop {
			let notified = self.idle.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.pending.load(Ordering::SeqCst) == 0 {
				return;
			}
			notified.await;
		}
	}
}

#[async_trait::async_trait]
impl BackgroundWorker for TokioWorker {
	fn perform(&self, job: Job) {
		let Some(tx) = self.sender() else {
			debug!("Background worker shut down, dropping job");
			return;
		};

		self.pending.fetch_add(1, Ordering::SeqCst);
		if let Err(e) = tx.try_send(job) {
			self.pending.fetch_sub(1, Ordering::SeqCst);
			match e {
				TrySendError::Full(_) => warn!("Background queue full, dropping job"),
				TrySendError::Closed(_) => debug!("Background queue closed, dropping job"),
			}
		}
	}

	async fn flush(&self, timeout: Duration) -> bool {
		tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
	}

	async fn shutdown(&self, timeout: Duration) {
		let tx = match self.tx.lock() {
			Ok(mut guard) => guard.take(),
			Err(poisoned) => poisoned.into_inner().take(),
		};
		drop(tx);

		if !self.flush(timeout).await {
			warn!(pending = self.pending(), "Background worker shutdown timed out");
		}

		let tasks = match self.tasks.lock() {
			Ok(mut guard) => std::mem::take(&mut *guard),
			Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
		};
		for task in tasks {
			task.abort();
		}
		info!("Background worker shut down");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::sync::oneshot;

	fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
		let counter = counter.clone();
		Box::pin(async move {
			counter.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[tokio::test]
	async fn test_runs_jobs_and_flushes() {
		let worker = TokioWorker::spawn(&Handle::current(), 2, 30);
		let counter = Arc::new(AtomicUsize::new(0));
		for _ in 0..10 {
			worker.perform(counting_job(&counter));
		}
		assert!(worker.flush(Duration::from_secs(5)).await);
		assert_eq!(counter.load(Ordering::SeqCst), 10);
		assert_eq!(worker.pending(), 0);
	}

	#[tokio::test]
	async fn test_full_queue_drops_jobs() {
		let worker = TokioWorker::spawn(&Handle::current(), 1, 1);
		let counter = Arc::new(AtomicUsize::new(0));

		let (started_tx, started_rx) = oneshot::channel::<()>();
		let (release_tx, release_rx) = oneshot::channel::<()>();
		worker.perform(Box::pin(async move {
			let _ = started_tx.send(());
			let _ = release_rx.await;
		}));
		started_rx.await.unwrap();

		worker.perform(counting_job(&counter));
		worker.perform(counting_job(&counter));
		assert_eq!(worker.pending(), 2);

		release_tx.send(()).unwrap();
		assert!(worker.flush(Duration::from_secs(5)).await);
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_flush_times_out_on_stuck_job() {
		let worker = TokioWorker::spawn(&Handle::current(), 1, 4);
		worker.perform(Box::pin(futures::future::pending::<()>()));
		assert!(!worker.flush(Duration::from_millis(50)).await);
	}

	#[tokio::test]
	async fn test_panicking_job_does_not_stall_worker() {
		let worker = TokioWorker::spawn(&Handle::current(), 1, 4);
		let counter = Arc::new(AtomicUsize::new(0));
		worker.perform(Box::pin(async { panic!("job failure") }));
		worker.perform(counting_job(&counter));
		assert!(worker.flush(Duration::from_secs(5)).await);
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_shutdown_drains_and_rejects() {
		let worker = TokioWorker::spawn(&Handle::current(), 1, 30);
		let counter = Arc::new(AtomicUsize::new(0));
		for _ in 0..5 {
			worker.perform(counting_job(&counter));
		}
		worker.shutdown(Duration::from_secs(5)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 5);

		worker.perform(counting_job(&counter));
		tokio::task::yield_now().await;
		assert_eq!(counter.load(Ordering::SeqCst), 5);
		assert_eq!(worker.pending(), 0);
	}
}
