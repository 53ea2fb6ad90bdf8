// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event assembly from errors, messages and request context.

use std::sync::Arc;

use loom_capture_core::{
	AddressResolver, CapturedError, Event, ExceptionChain, RawBacktrace, RequestContext,
	RequestEnv, SdkInfo, ThreadsSnapshot,
};
use serde_json::Value;
use tracing::debug;

use crate::backtrace::BacktraceNormalizer;
use crate::options::ClientOptions;

/// Builds events and attaches their sub-records according to the client
/// options.
#[derive(Debug, Clone)]
pub struct EventBuilder {
	options: Arc<ClientOptions>,
	normalizer: BacktraceNormalizer,
	resolver: AddressResolver,
}

impl EventBuilder {
	pub fn new(options: Arc<ClientOptions>) -> Self {
		let normalizer = BacktraceNormalizer::new(
			options.project_root.clone(),
			options.context_lines,
			options.source_cache.clone(),
		);
		let resolver = AddressResolver::new(options.trust_proxy_headers);
		Self {
			options,
			normalizer,
			resolver,
		}
	}

	pub fn normalizer(&self) -> &BacktraceNormalizer {
		&self.normalizer
	}

	/// A fresh error-level event stamped with the configured origin.
	///
	/// `integration` replaces the default SDK identity.
	pub fn new_event(&self, integration: Option<&SdkInfo>, message: Option<String>) -> Event {
		let sdk = integration.cloned().unwrap_or_default();
		let mut event = Event::new(self.options.origin(sdk));
		if self.options.send_modules {
			event.modules = Some(self.options.modules.clone());
		}
		if let Some(message) = message {
			event.message = message;
		}
		event
	}

	/// Attaches request context derived from `env`.
	///
	/// Does nothing when the event already carries a request or `env` is
	/// empty. With `send_default_pii` the resolved client address is stored
	/// as `user.ip_address`.
	pub fn attach_request(&self, event: &mut Event, env: &RequestEnv) {
		if event.request().is_some() || env.is_empty() {
			return;
		}

		let send_pii = self.options.send_default_pii;
		if !event.attach_request(RequestContext::from_env(env, send_pii)) {
			return;
		}

		if send_pii {
			if let Some(ip) = self.resolver.resolve(env) {
				event
					.user
					.insert("ip_address".to_string(), Value::String(ip.to_string()));
			}
		}
		if let Some(request_id) = env.request_id() {
			event
				.tags
				.insert("request_id".to_string(), request_id.to_string());
		}
	}

	/// Attaches the exception chain for `error`, merging every link's
	/// context into `extra`. On a shared key the link closest to the leaf wins.
	pub fn attach_exception(&self, event: &mut Event, error: &CapturedError) {
		for link in error.links().iter().rev() {
			for (key, value) in &link.context {
				event.extra.insert(key.clone(), value.clone());
			}
		}

		let chain = ExceptionChain::extract(error, |bt| self.normalizer.normalize(bt));
		debug!(
			event_id = %event.event_id(),
			records = chain.values.len(),
			"Attached exception chain"
		);
		event.attach_exception(chain);
	}

	/// Attaches a flat stack, for events that carry no exception.
	pub fn attach_stacktrace(&self, event: &mut Event, backtrace: &RawBacktrace) {
		event.attach_stacktrace(self.normalizer.normalize(backtrace));
	}

	/// Attaches a snapshot of the calling thread.
	pub fn attach_threads(&self, event: &mut Event, backtrace: Option<&RawBacktrace>, crashed: bool) {
		let stacktrace = backtrace.map(|bt| self.normalizer.normalize(bt));
		event.attach_threads(ThreadsSnapshot::current(crashed, stacktrace));
	}
}
