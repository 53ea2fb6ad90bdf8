// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capture client: builds events and decides how they are delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loom_capture_core::{CapturedError, CompletedTransaction, Event, EventType, Level};
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::backtrace::capture_backtrace;
use crate::builder::EventBuilder;
use crate::error::{CaptureSdkError, Result};
use crate::hint::DispatchHint;
use crate::options::{ClientOptions, ClientOptionsBuilder};
use crate::scope::Scope;
use crate::transport::{select_transport, Transport};
use crate::worker::{BackgroundWorker, TokioWorker};

/// Captures errors, messages and transactions and delivers them to the
/// collector.
///
/// Cloning is cheap; clones share the transport, worker and closed state.
///
/// # Example
///
/// ```ignore
/// let options = ClientOptions::builder()
///     .dsn("https://key@collector.example.com/42")
///     .environment("production")
///     .build()?;
/// let client = CaptureClient::new(options)?;
///
/// let scope = ContextScope::default();
/// if let Err(e) = do_work() {
///     client.capture_error(&e, &scope, DispatchHint::default()).await;
/// }
///
/// client.shutdown(Duration::from_secs(2)).await;
/// ```
#[derive(Clone)]
pub struct CaptureClient {
	inner: Arc<ClientInner>,
}

struct ClientInner {
	options: Arc<ClientOptions>,
	builder: EventBuilder,
	transport: Arc<dyn Transport>,
	worker: Option<Arc<dyn BackgroundWorker>>,
	closed: AtomicBool,
}

impl std::fmt::Debug for CaptureClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CaptureClient")
			.field("transport", &self.inner.transport.name())
			.field("background", &self.inner.worker.is_some())
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl CaptureClient {
	pub fn builder() -> ClientOptionsBuilder {
		ClientOptionsBuilder::new()
	}

	/// A client configured from `LOOM_CAPTURE_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::new(ClientOptionsBuilder::from_env().build()?)
	}

	/// Creates a client.
	///
	/// A background worker is started when `background_worker_threads` is
	/// non-zero and a tokio runtime is running, unless one is supplied in the
	/// options.
	pub fn new(options: ClientOptions) -> Result<Self> {
		let transport = select_transport(&options)?;

		let worker: Option<Arc<dyn BackgroundWorker>> = match &options.background_worker {
			Some(worker) => Some(worker.clone()),
			None if options.background_worker_threads > 0 => Handle::try_current().ok().map(|handle| {
				Arc::new(TokioWorker::spawn(
					&handle,
					options.background_worker_threads,
					options.background_queue_size,
				)) as Arc<dyn BackgroundWorker>
			}),
			None => None,
		};

		info!(
			transport = transport.name(),
			background = worker.is_some(),
			environment = ?options.environment,
			"Capture client initialized"
		);

		let options = Arc::new(options);
		Ok(Self {
			inner: Arc::new(ClientInner {
				builder: EventBuilder::new(options.clone()),
				options,
				transport,
				worker,
				closed: AtomicBool::new(false),
			}),
		})
	}

	pub fn options(&self) -> &ClientOptions {
		&self.inner.options
	}

	/// The builder used for new events, for attaching request context.
	pub fn event_builder(&self) -> &EventBuilder {
		&self.inner.builder
	}

	/// Whether captures currently proceed. Sampling makes this
	/// non-deterministic when `sample_rate` is below one.
	pub fn sending_allowed(&self) -> bool {
		!self.is_closed() && self.inner.options.sending_allowed()
	}

	/// The deterministic part of [`Self::sending_allowed`], used to skip event
	/// building. Sampling is left to [`Self::capture_event`].
	fn accepting_events(&self) -> bool {
		!self.is_closed() && self.inner.options.delivery_configured()
	}

	/// Applies `scope` and dispatches the event.
	///
	/// Returns `None` without side effects when sending is not allowed.
	/// Delivery failures are logged, never returned.
	pub async fn capture_event(&self, mut event: Event, scope: &dyn Scope, hint: DispatchHint) -> Option<Event> {
		if !self.sending_allowed() {
			debug!(event_id = %event.event_id(), "Sending not allowed, skipping event");
			return None;
		}

		scope.apply_to_event(&mut event, &hint);

		if let Some(callback) = &self.inner.options.async_callback {
			match event.to_value() {
				Ok(payload) => match callback(payload, hint.clone()).await {
					Ok(()) => {
						debug!(event_id = %event.event_id(), "Event handed to async callback");
						return Some(event);
					}
					Err(e) => {
						let e = CaptureSdkError::Callback(e.to_string());
						error!(event_id = %event.event_id(), error = %e, "Async callback failed, sending directly");
					}
				},
				Err(e) => {
					error!(event_id = %event.event_id(), error = %e, "Failed to serialize event for async callback");
				}
			}
		}

		self.dispatch(event.clone(), hint).await;
		Some(event)
	}

	async fn dispatch(&self, event: Event, hint: DispatchHint) {
		let event_id = event.event_id();

		if hint.background {
			if let Some(worker) = &self.inner.worker {
				debug!(event_id = %event_id, "Queueing event for background delivery");
				let client = self.clone();
				worker.perform(Box::pin(async move {
					if let Err(e) = client.send_event(event, Some(&hint)).await {
						error!(event_id = %event_id, error = %e, "Failed to send event");
					}
				}));
				return;
			}
		}

		if let Err(e) = self.send_event(event, Some(&hint)).await {
			error!(event_id = %event_id, error = %e, "Failed to send event");
		}
	}

	/// Runs `before_send` for error events and hands the event to the
	/// transport. Returns `Ok(None)` when `before_send` discards it.
	pub async fn send_event(&self, mut event: Event, hint: Option<&DispatchHint>) -> Result<Option<Event>> {
		if event.event_type() == EventType::Event {
			if let Some(before_send) = &self.inner.options.before_send {
				let default_hint = DispatchHint::default();
				let hint = hint.unwrap_or(&default_hint);
				let event_id = event.event_id();
				match before_send(event, hint) {
					Some(kept) => event = kept,
					None => {
						info!(event_id = %event_id, "Event discarded by before_send");
						return Ok(None);
					}
				}
			}
		}

		let payload = event.to_value()?;
		self.inner.transport.send_event(payload).await?;
		debug!(
			event_id = %event.event_id(),
			transport = self.inner.transport.name(),
			"Event sent"
		);
		Ok(Some(event))
	}

	/// Builds an error event, or `None` when the error type is excluded.
	///
	/// The exception carries the stack, so the thread snapshot has none.
	pub fn event_from_error(&self, error: &CapturedError, hint: &DispatchHint) -> Option<Event> {
		if !self.inner.options.exception_allowed(error) {
			debug!(error_type = %error.leaf().ty, "Error type excluded, skipping");
			return None;
		}

		let sdk = self.inner.options.sdk_for(hint.integration.as_deref());
		let builder = &self.inner.builder;
		let mut event = builder.new_event(Some(&sdk), None);
		builder.attach_exception(&mut event, error);
		builder.attach_threads(&mut event, None, true);
		Some(event)
	}

	/// Builds a message event carrying the current call stack.
	pub fn event_from_message(&self, message: impl Into<String>, level: Level, hint: &DispatchHint) -> Event {
		let sdk = self.inner.options.sdk_for(hint.integration.as_deref());
		let builder = &self.inner.builder;
		let mut event = builder.new_event(Some(&sdk), Some(message.into()));
		event.level = Some(level);
		builder.attach_stacktrace(&mut event, &capture_backtrace());
		builder.attach_threads(&mut event, None, false);
		event
	}

	/// Builds a transaction event from a finished transaction.
	pub fn event_from_transaction(&self, transaction: &CompletedTransaction) -> Event {
		let options = &self.inner.options;
		let mut event = Event::from_transaction(options.origin(Default::default()), transaction);
		if options.send_modules {
			event.modules = Some(options.modules.clone());
		}
		event
	}

	/// Captures a standard error and its `source()` chain.
	pub async fn capture_error(
		&self,
		error: &(dyn std::error::Error + Send + Sync + 'static),
		scope: &dyn Scope,
		hint: DispatchHint,
	) -> Option<Event> {
		let captured = CapturedError::from_dyn(error).with_backtrace(capture_backtrace());
		self.capture_exception(&captured, scope, hint).await
	}

	pub async fn capture_exception(&self, error: &CapturedError, scope: &dyn Scope, hint: DispatchHint) -> Option<Event> {
		if !self.accepting_events() {
			return None;
		}
		let event = self.event_from_error(error, &hint)?;
		self.capture_event(event, scope, hint).await
	}

	pub async fn capture_message(
		&self,
		message: impl Into<String>,
		level: Level,
		scope: &dyn Scope,
		hint: DispatchHint,
	) -> Option<Event> {
		if !self.accepting_events() {
			return None;
		}
		let event = self.event_from_message(message, level, &hint);
		self.capture_event(event, scope, hint).await
	}

	pub async fn capture_transaction(&self, transaction: &CompletedTransaction, scope: &dyn Scope) -> Option<Event> {
		if !self.accepting_events() {
			return None;
		}
		let event = self.event_from_transaction(transaction);
		self.capture_event(event, scope, DispatchHint::default()).await
	}

	/// Waits for queued events. Returns false if `timeout` elapsed first.
	pub async fn flush(&self, timeout: Duration) -> bool {
		match &self.inner.worker {
			Some(worker) => worker.flush(timeout).await,
			None => true,
		}
	}

	/// Stops accepting events and drains the background queue.
	pub async fn shutdown(&self, timeout: Duration) {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(worker) = &self.inner.worker {
			worker.shutdown(timeout).await;
		}
		info!("Capture client shutdown");
	}

	/// Returns true if the client has been shut down.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}
}
