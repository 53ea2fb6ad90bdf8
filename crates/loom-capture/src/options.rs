// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use loom_capture_core::{CapturedError, Event, EventOrigin, SdkInfo};
use serde_json::Value;

use crate::dsn::Dsn;
use crate::error::{CaptureSdkError, Result};
use crate::hint::DispatchHint;
use crate::source::{LineCache, SourceCache};
use crate::transport::Transport;
use crate::worker::BackgroundWorker;

pub const ENV_DSN: &str = "LOOM_CAPTURE_DSN";
pub const ENV_ENVIRONMENT: &str = "LOOM_CAPTURE_ENVIRONMENT";
pub const ENV_RELEASE: &str = "LOOM_CAPTURE_RELEASE";
pub const ENV_SERVER_NAME: &str = "LOOM_CAPTURE_SERVER_NAME";

const DEFAULT_ENVIRONMENT: &str = "production";
const DEFAULT_CONTEXT_LINES: usize = 3;
const DEFAULT_QUEUE_SIZE: usize = 30;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Inspects an event before it is sent. Returning `None` discards it.
pub type BeforeSend = Arc<dyn Fn(Event, &DispatchHint) -> Option<Event> + Send + Sync>;

/// Receives serialized events in place of the built-in delivery paths.
pub type AsyncCallback =
	Arc<dyn Fn(Value, DispatchHint) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Immutable client configuration, shared by every capture.
#[derive(Clone)]
pub struct ClientOptions {
	pub dsn: Option<Dsn>,
	pub server_name: Option<String>,
	pub environment: Option<String>,
	pub release: Option<String>,
	/// Include `modules` in every event.
	pub send_modules: bool,
	pub modules: BTreeMap<String, String>,
	/// Attach client IPs, cookies and IP-bearing headers.
	pub send_default_pii: bool,
	/// Consult `Client-IP`, `X-Real-IP` and `X-Forwarded-For` when resolving addresses.
	pub trust_proxy_headers: bool,
	pub project_root: Option<PathBuf>,
	/// Source lines collected around each frame. `None` disables context.
	pub context_lines: Option<usize>,
	pub source_cache: Arc<dyn SourceCache>,
	pub before_send: Option<BeforeSend>,
	pub async_callback: Option<AsyncCallback>,
	pub transport: Option<Arc<dyn Transport>>,
	pub background_worker: Option<Arc<dyn BackgroundWorker>>,
	/// Number of worker tasks. Zero sends every event on the calling task.
	pub background_worker_threads: usize,
	pub background_queue_size: usize,
	/// Error type names that are never reported. Matches either the full
	/// path or the bare type name.
	pub excluded_errors: Vec<String>,
	pub inspect_causes_for_exclusion: bool,
	/// Environments that send events. Empty means all.
	pub enabled_environments: Vec<String>,
	pub sample_rate: f64,
	pub request_timeout: Duration,
	/// SDK identities integrations report under, keyed by integration name.
	pub integrations: HashMap<String, SdkInfo>,
}

impl fmt::Debug for ClientOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientOptions")
			.field("dsn", &self.dsn.as_ref().map(|d| d.to_string()))
			.field("server_name", &self.server_name)
			.field("environment", &self.environment)
			.field("release", &self.release)
			.field("send_modules", &self.send_modules)
			.field("send_default_pii", &self.send_default_pii)
			.field("trust_proxy_headers", &self.trust_proxy_headers)
			.field("project_root", &self.project_root)
			.field("context_lines", &self.context_lines)
			.field("before_send", &self.before_send.is_some())
			.field("async_callback", &self.async_callback.is_some())
			.field("transport", &self.transport.as_ref().map(|t| t.name()))
			.field("background_worker", &self.background_worker.is_some())
			.field("background_worker_threads", &self.background_worker_threads)
			.field("background_queue_size", &self.background_queue_size)
			.field("excluded_errors", &self.excluded_errors)
			.field("enabled_environments", &self.enabled_environments)
			.field("sample_rate", &self.sample_rate)
			.field("request_timeout", &self.request_timeout)
			.finish_non_exhaustive()
	}
}

impl Default for ClientOptions {
	fn default() -> Self {
		Self {
			dsn: None,
			server_name: None,
			environment: Some(DEFAULT_ENVIRONMENT.to_string()),
			release: None,
			send_modules: false,
			modules: BTreeMap::new(),
			send_default_pii: false,
			trust_proxy_headers: false,
			project_root: None,
			context_lines: Some(DEFAULT_CONTEXT_LINES),
			source_cache: Arc::new(LineCache::new()),
			before_send: None,
			async_callback: None,
			transport: None,
			background_worker: None,
			background_worker_threads: std::thread::available_parallelism()
				.map(|n| n.get())
				.unwrap_or(1),
			background_queue_size: DEFAULT_QUEUE_SIZE,
			excluded_errors: Vec::new(),
			inspect_causes_for_exclusion: false,
			enabled_environments: Vec::new(),
			sample_rate: 1.0,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			integrations: HashMap::new(),
		}
	}
}

impl ClientOptions {
	pub fn builder() -> ClientOptionsBuilder {
		ClientOptionsBuilder::new()
	}

	/// Whether a capture should proceed at all: a delivery target exists,
	/// the environment is enabled and the event is sampled in.
	///
	/// Each call draws a fresh sample; call it once per capture.
	pub fn sending_allowed(&self) -> bool {
		self.delivery_configured() && self.sampled()
	}

	/// The deterministic part of [`Self::sending_allowed`]: a delivery target
	/// exists and the environment is enabled.
	pub fn delivery_configured(&self) -> bool {
		(self.dsn.is_some() || self.transport.is_some()) && self.environment_enabled()
	}

	pub fn environment_enabled(&self) -> bool {
		if self.enabled_environments.is_empty() {
			return true;
		}
		self.environment
			.as_deref()
			.is_some_and(|env| self.enabled_environments.iter().any(|e| e == env))
	}

	/// Draws once against `sample_rate`.
	pub fn sampled(&self) -> bool {
		self.sample_rate >= 1.0 || rand::random::<f64>() < self.sample_rate
	}

	/// Whether an error is reportable given `excluded_errors`.
	pub fn exception_allowed(&self, error: &CapturedError) -> bool {
		if self.inspect_causes_for_exclusion {
			!error.links().iter().any(|link| self.is_excluded(&link.ty))
		} else {
			!self.is_excluded(&error.leaf().ty)
		}
	}

	fn is_excluded(&self, ty: &str) -> bool {
		let path = ty.split('<').next().unwrap_or(ty);
		let bare = path.rsplit("::").next().unwrap_or(path);
		self.excluded_errors
			.iter()
			.any(|excluded| excluded == ty || excluded == path || excluded == bare)
	}

	/// The SDK identity for an integration, or the default one.
	pub fn sdk_for(&self, integration: Option<&str>) -> SdkInfo {
		integration
			.and_then(|name| self.integrations.get(name))
			.cloned()
			.unwrap_or_default()
	}

	pub fn origin(&self, sdk: SdkInfo) -> EventOrigin {
		EventOrigin {
			server_name: self.server_name.clone(),
			environment: self.environment.clone(),
			release: self.release.clone(),
			sdk,
		}
	}
}

/// Builder for [`ClientOptions`].
#[derive(Default)]
pub struct ClientOptionsBuilder {
	dsn: Option<String>,
	options: ClientOptions,
}

impl ClientOptionsBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// A builder seeded from `LOOM_CAPTURE_*` environment variables.
	pub fn from_env() -> Self {
		let mut builder = Self::new();
		if let Some(dsn) = env_var(ENV_DSN) {
			builder = builder.dsn(dsn);
		}
		if let Some(env) = env_var(ENV_ENVIRONMENT) {
			builder = builder.environment(env);
		}
		if let Some(release) = env_var(ENV_RELEASE) {
			builder = builder.release(release);
		}
		if let Some(name) = env_var(ENV_SERVER_NAME) {
			builder = builder.server_name(name);
		}
		builder
	}

	/// Sets the collector DSN, e.g. `https://key@collector.example.com/42`.
	pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
		self.dsn = Some(dsn.into());
		self
	}

	pub fn server_name(mut self, name: impl Into<String>) -> Self {
		self.options.server_name = Some(name.into());
		self
	}

	/// Sets the environment name, e.g. `production` or `staging`.
	pub fn environment(mut self, env: impl Into<String>) -> Self {
		self.options.environment = Some(env.into());
		self
	}

	pub fn release(mut self, release: impl Into<String>) -> Self {
		self.options.release = Some(release.into());
		self
	}

	pub fn send_modules(mut self, enabled: bool) -> Self {
		self.options.send_modules = enabled;
		self
	}

	pub fn module(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
		self.options.modules.insert(name.into(), version.into());
		self
	}

	pub fn send_default_pii(mut self, enabled: bool) -> Self {
		self.options.send_default_pii = enabled;
		self
	}

	pub fn trust_proxy_headers(mut self, enabled: bool) -> Self {
		self.options.trust_proxy_headers = enabled;
		self
	}

	pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
		self.options.project_root = Some(root.into());
		self
	}

	pub fn context_lines(mut self, lines: Option<usize>) -> Self {
		self.options.context_lines = lines;
		self
	}

	pub fn source_cache(mut self, cache: Arc<dyn SourceCache>) -> Self {
		self.options.source_cache = cache;
		self
	}

	pub fn before_send<F>(mut self, hook: F) -> Self
	where
		F: Fn(Event, &DispatchHint) -> Option<Event> + Send + Sync + 'static,
	{
		self.options.before_send = Some(Arc::new(hook));
		self
	}

	pub fn async_callback<F>(mut self, callback: F) -> Self
	where
		F: Fn(Value, DispatchHint) -> BoxFuture<'static, std::result::Result<(), BoxError>>
			+ Send
			+ Sync
			+ 'static,
	{
		self.options.async_callback = Some(Arc::new(callback));
		self
	}

	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.options.transport = Some(transport);
		self
	}

	pub fn background_worker(mut self, worker: Arc<dyn BackgroundWorker>) -> Self {
		self.options.background_worker = Some(worker);
		self
	}

	pub fn background_worker_threads(mut self, threads: usize) -> Self {
		self.options.background_worker_threads = threads;
		self
	}

	pub fn background_queue_size(mut self, size: usize) -> Self {
		self.options.background_queue_size = size;
		self
	}

	pub fn exclude_error(mut self, ty: impl Into<String>) -> Self {
		self.options.excluded_errors.push(ty.into());
		self
	}

	pub fn inspect_causes_for_exclusion(mut self, enabled: bool) -> Self {
		self.options.inspect_causes_for_exclusion = enabled;
		self
	}

	pub fn enabled_environments<I, S>(mut self, envs: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.options.enabled_environments = envs.into_iter().map(Into::into).collect();
		self
	}

	/// Sets the fraction of events sent (0.0-1.0).
	pub fn sample_rate(mut self, rate: f64) -> Self {
		self.options.sample_rate = rate;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.options.request_timeout = timeout;
		self
	}

	pub fn integration(mut self, name: impl Into<String>, sdk: SdkInfo) -> Self {
		self.options.integrations.insert(name.into(), sdk);
		self
	}

	pub fn build(self) -> Result<ClientOptions> {
		let mut options = self.options;
		options.dsn = self.dsn.map(|dsn| dsn.parse::<Dsn>()).transpose()?;

		if options.sample_rate.is_nan() {
			return Err(CaptureSdkError::InvalidOption(
				"sample_rate must be a number".to_string(),
			));
		}
		options.sample_rate = options.sample_rate.clamp(0.0, 1.0);
		if options.background_queue_size == 0 {
			return Err(CaptureSdkError::InvalidOption(
				"background_queue_size must be positive".to_string(),
			));
		}

		Ok(options)
	}
}

fn env_var(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_capture_core::ErrorLink;

	fn options() -> ClientOptions {
		ClientOptions::builder()
			.dsn("https://key@collector.example.com/1")
			.build()
			.unwrap()
	}

	#[test]
	fn defaults() {
		let options = ClientOptions::default();
		assert_eq!(options.environment.as_deref(), Some("production"));
		assert_eq!(options.background_queue_size, 30);
		assert_eq!(options.context_lines, Some(3));
		assert!(!options.send_default_pii);
		assert!(!options.trust_proxy_headers);
		assert!(!options.sending_allowed());
	}

	#[test]
	fn build_rejects_bad_dsn() {
		let result = ClientOptions::builder().dsn("not a dsn").build();
		assert!(matches!(result, Err(CaptureSdkError::InvalidDsn(_))));
	}

	#[test]
	fn build_clamps_sample_rate() {
		let options = ClientOptions::builder().sample_rate(4.0).build().unwrap();
		assert_eq!(options.sample_rate, 1.0);
		let options = ClientOptions::builder().sample_rate(-1.0).build().unwrap();
		assert_eq!(options.sample_rate, 0.0);
		assert!(ClientOptions::builder().sample_rate(f64::NAN).build().is_err());
	}

	#[test]
	fn sending_requires_target_environment_and_sample() {
		assert!(options().sending_allowed());

		let mut opts = options();
		opts.enabled_environments = vec!["staging".to_string()];
		assert!(!opts.sending_allowed());
		opts.environment = Some("staging".to_string());
		assert!(opts.sending_allowed());

		let mut opts = options();
		opts.sample_rate = 0.0;
		assert!(!opts.sending_allowed());
		assert!(!opts.sampled());
	}

	#[test]
	fn delivery_configured_ignores_sampling() {
		let mut opts = options();
		opts.sample_rate = 0.0;
		assert!(opts.delivery_configured());

		opts.enabled_environments = vec!["staging".to_string()];
		assert!(!opts.delivery_configured());
		assert!(!ClientOptions::default().delivery_configured());
	}

	#[test]
	fn exclusion_matches_full_and_bare_names() {
		let mut opts = options();
		opts.excluded_errors = vec!["ParseIntError".to_string()];
		let err = CapturedError::new(ErrorLink::new("core::num::ParseIntError", "bad"));
		assert!(!opts.exception_allowed(&err));

		opts.excluded_errors = vec!["core::num::ParseIntError".to_string()];
		assert!(!opts.exception_allowed(&err));

		opts.excluded_errors = vec!["IoError".to_string()];
		assert!(opts.exception_allowed(&err));
	}

	#[test]
	fn causes_are_inspected_only_when_enabled() {
		let mut opts = options();
		opts.excluded_errors = vec!["std::io::Error".to_string()];
		let err = CapturedError::new(ErrorLink::new("app::LoadError", "load failed"))
			.caused_by(ErrorLink::new("std::io::Error", "not found"));

		assert!(opts.exception_allowed(&err));
		opts.inspect_causes_for_exclusion = true;
		assert!(!opts.exception_allowed(&err));
	}

	#[test]
	fn integration_sdk_lookup() {
		let opts = ClientOptions::builder()
			.integration("axum", SdkInfo::new("loom-capture-axum", "0.2.0"))
			.build()
			.unwrap();
		assert_eq!(opts.sdk_for(Some("axum")).name, "loom-capture-axum");
		assert_eq!(opts.sdk_for(Some("other")), SdkInfo::default());
		assert_eq!(opts.sdk_for(None), SdkInfo::default());
	}
}
