// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event delivery to the collector.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dsn::Dsn;
use crate::error::{CaptureSdkError, Result};
use crate::options::ClientOptions;

const USER_AGENT: &str = concat!("loom-capture-rust/", env!("CARGO_PKG_VERSION"));

/// Applied when a 429 response carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Delivers serialized events.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	/// Send one serialized event.
	async fn send_event(&self, payload: Value) -> Result<()>;

	/// Short name used in logs.
	fn name(&self) -> &'static str;
}

/// Picks the transport for a set of options: the configured override, HTTP
/// for `http`/`https` DSNs, otherwise one that discards events.
pub fn select_transport(options: &ClientOptions) -> Result<Arc<dyn Transport>> {
	if let Some(transport) = &options.transport {
		return Ok(transport.clone());
	}
	match &options.dsn {
		Some(dsn) if dsn.is_http() => Ok(Arc::new(HttpTransport::new(dsn, options.request_timeout)?)),
		Some(dsn) => {
			warn!(scheme = %dsn.scheme(), "No transport for DSN scheme, events will be discarded");
			Ok(Arc::new(NoopTransport))
		}
		None => Ok(Arc::new(NoopTransport)),
	}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

#[async_trait::async_trait]
impl Transport for NoopTransport {
	async fn send_event(&self, payload: Value) -> Result<()> {
		let event_id = payload.get("event_id").and_then(Value::as_str).unwrap_or_default();
		debug!(event_id = %event_id, "Discarding event, no transport configured");
		Ok(())
	}

	fn name(&self) -> &'static str {
		"noop"
	}
}

/// Posts events as JSON to the DSN's store endpoint.
#[derive(Debug)]
pub struct HttpTransport {
	client: Client,
	url: String,
	public_key: String,
	rate_limited_until: Mutex<Option<Instant>>,
}

impl HttpTransport {
	pub fn new(dsn: &Dsn, timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.timeout(timeout)
			.user_agent(USER_AGENT)
			.build()?;

		Ok(Self {
			client,
			url: dsn.store_url(),
			public_key: dsn.public_key().to_string(),
			rate_limited_until: Mutex::new(None),
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// Remaining time before sends are allowed again.
	fn rate_limit_remaining(&self) -> Option<Duration> {
		let mut until = match self.rate_limited_until.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		let deadline = (*until)?;
		let now = Instant::now();
		if deadline > now {
			Some(deadline - now)
		} else {
			*until = None;
			None
		}
	}

	fn set_rate_limit(&self, retry_after: Duration) {
		let mut until = match self.rate_limited_until.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		*until = Some(Instant::now() + retry_after);
	}
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
	async fn send_event(&self, payload: Value) -> Result<()> {
		if let Some(remaining) = self.rate_limit_remaining() {
			return Err(CaptureSdkError::RateLimited {
				retry_after_secs: Some(remaining.as_secs().max(1)),
			});
		}

		let event_id = payload
			.get("event_id")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		debug!(url = %self.url, event_id = %event_id, "Sending event");

		let response = self
			.client
			.post(&self.url)
			.header("Authorization", format!("Bearer {}", self.public_key))
			.json(&payload)
			.send()
			.await?;

		if response.status() == StatusCode::TOO_MANY_REQUESTS {
			let retry_after = response
				.headers()
				.get("Retry-After")
				.and_then(|v| v.to_str().ok())
				.and_then(|s| s.trim().parse::<u64>().ok());
			self.set_rate_limit(retry_after.map(Duration::from_secs).unwrap_or(DEFAULT_RETRY_AFTER));
			warn!(event_id = %event_id, retry_after_secs = ?retry_after, "Collector rate limited event");
			return Err(CaptureSdkError::RateLimited {
				retry_after_secs: retry_after,
			});
		}

		if !response.status().is_success() {
			let status = response.status().as_u16();
			let message = response.text().await.unwrap_or_default();
			return Err(CaptureSdkError::ServerError { status, message });
		}

		info!(event_id = %event_id, "Event delivered");
		Ok(())
	}

	fn name(&self) -> &'static str {
		"http"
	}
}
