// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Capture an error, a message and a request-scoped event.
//!
//! Run with:
//!   LOOM_CAPTURE_DSN=https://key@localhost:8080/1 cargo run --example capture -p loom-capture

use std::time::Duration;

use loom_capture::{Breadcrumb, CaptureClient, ClientOptionsBuilder, ContextScope, DispatchHint, Level, RequestEnv};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct ConfigError {
	source: std::io::Error,
}

impl std::fmt::Display for ConfigError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "failed to load configuration")
	}
}

impl std::error::Error for ConfigError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.source)
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
		.init();

	let options = ClientOptionsBuilder::from_env()
		.release("0.1.0-example")
		.environment("development")
		.send_default_pii(true)
		.project_root(env!("CARGO_MANIFEST_DIR"))
		.before_send(|mut event, _hint| {
			event.tags.insert("example".to_string(), "true".to_string());
			Some(event)
		})
		.build()?;
	let client = CaptureClient::new(options)?;
	println!("Initialized: {client:?}");

	let scope = ContextScope::default();
	scope.set_tag("rust_version", "1.75.0");
	scope.add_breadcrumb(Breadcrumb::new("startup", "Application started"));
	scope.add_breadcrumb(Breadcrumb::new("http", "GET /api/data failed").with_level(Level::Warning));

	let error = ConfigError {
		source: std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml not found"),
	};
	if let Some(event) = client.capture_error(&error, &scope, DispatchHint::default()).await {
		println!("Captured error event {}", event.event_id());
	}

	let hint = DispatchHint::foreground();
	let mut event = client.event_from_message("Checkout failed", Level::Error, &hint);
	let env = RequestEnv::new()
		.with("REQUEST_METHOD", "POST")
		.with("SERVER_NAME", "shop.example.com")
		.with("SERVER_PORT", "443")
		.with("HTTPS", "on")
		.with("PATH_INFO", "/checkout")
		.with("HTTP_X_REQUEST_ID", "req-example-1")
		.with("REMOTE_ADDR", "203.0.113.7:51234");
	client.event_builder().attach_request(&mut event, &env);
	if let Some(event) = client.capture_event(event, &scope, hint).await {
		println!("Captured message event {}", event.event_id());
	}

	client.flush(Duration::from_secs(5)).await;
	client.shutdown(Duration::from_secs(5)).await;
	println!("Done");
	Ok(())
}
