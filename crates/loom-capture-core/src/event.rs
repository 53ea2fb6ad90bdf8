// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event record and its serialized form.
//!
//! Every optional attribute is checked individually for presence when the
//! event is encoded: unset options, empty maps and empty lists never appear
//! in the payload, and the payload decodes back into an equal [`Event`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::breadcrumb::Breadcrumb;
use crate::context::{SdkInfo, ThreadsSnapshot, TraceContext};
use crate::error::{CaptureError, Result};
use crate::exception::ExceptionChain;
use crate::level::Level;
use crate::request::RequestContext;
use crate::stacktrace::Stacktrace;
use crate::transaction::{CompletedTransaction, SpanRecord};

/// Platform reported for every event.
pub const PLATFORM: &str = "rust";

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Unique event identifier, rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EventId(Uuid);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for EventId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

impl From<EventId> for String {
	fn from(id: EventId) -> Self {
		id.to_string()
	}
}

impl TryFrom<String> for EventId {
	type Error = uuid::Error;

	fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
		s.parse()
	}
}

/// Category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	#[default]
	Event,
	Transaction,
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Event => write!(f, "event"),
			Self::Transaction => write!(f, "transaction"),
		}
	}
}

impl FromStr for EventType {
	type Err = CaptureError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"event" => Ok(Self::Event),
			"transaction" => Ok(Self::Transaction),
			_ => Err(CaptureError::InvalidEventType(s.to_string())),
		}
	}
}

/// Point in time of an event: epoch seconds, or a caller-supplied raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
	Epoch(f64),
	Raw(String),
}

impl Timestamp {
	pub fn now() -> Self {
		Utc::now().into()
	}
}

impl From<DateTime<Utc>> for Timestamp {
	fn from(time: DateTime<Utc>) -> Self {
		Self::Epoch(epoch_seconds(time))
	}
}

impl From<f64> for Timestamp {
	fn from(secs: f64) -> Self {
		Self::Epoch(secs)
	}
}

impl From<String> for Timestamp {
	fn from(raw: String) -> Self {
		Self::Raw(raw)
	}
}

impl From<&str> for Timestamp {
	fn from(raw: &str) -> Self {
		Self::Raw(raw.to_string())
	}
}

/// Seconds since the UNIX epoch with microsecond precision.
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
	time.timestamp_micros() as f64 / 1_000_000.0
}

/// A `{ "values": [...] }` list wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Values<T> {
	pub values: Vec<T>,
}

impl<T> Default for Values<T> {
	fn default() -> Self {
		Self { values: Vec::new() }
	}
}

impl<T> Values<T> {
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// Attributes copied from the client configuration into every new event.
#[derive(Debug, Clone, Default)]
pub struct EventOrigin {
	pub server_name: Option<String>,
	pub environment: Option<String>,
	pub release: Option<String>,
	pub sdk: SdkInfo,
}

/// A captured error, message or transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	event_id: EventId,
	#[serde(rename = "type", default)]
	ty: EventType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub level: Option<Level>,
	pub timestamp: Timestamp,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_timestamp: Option<Timestamp>,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub message: String,
	platform: String,
	sdk: SdkInfo,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	server_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	environment: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	release: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub modules: Option<BTreeMap<String, String>>,
	#[serde(default, skip_serializing_if = "JsonMap::is_empty")]
	pub user: JsonMap,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub tags: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "JsonMap::is_empty")]
	pub extra: JsonMap,
	#[serde(default, skip_serializing_if = "JsonMap::is_empty")]
	pub contexts: JsonMap,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub fingerprint: Vec<String>,
	#[serde(default, skip_serializing_if = "Values::is_empty")]
	pub breadcrumbs: Values<Breadcrumb>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	request: Option<RequestContext>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	exception: Option<ExceptionChain>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	stacktrace: Option<Stacktrace>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	threads: Option<ThreadsSnapshot>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub spans: Vec<SpanRecord>,
}

impl Event {
	/// A new error-level event with a fresh id and the current time.
	pub fn new(origin: EventOrigin) -> Self {
		Self {
			event_id: EventId::new(),
			ty: EventType::Event,
			level: Some(Level::Error),
			timestamp: Timestamp::now(),
			start_timestamp: None,
			message: String::new(),
			platform: PLATFORM.to_string(),
			sdk: origin.sdk,
			server_name: origin.server_name,
			environment: origin.environment,
			release: origin.release,
			transaction: None,
			modules: None,
			user: JsonMap::new(),
			tags: BTreeMap::new(),
			extra: JsonMap::new(),
			contexts: JsonMap::new(),
			fingerprint: Vec::new(),
			breadcrumbs: Values::default(),
			request: None,
			exception: None,
			stacktrace: None,
			threads: None,
			spans: Vec::new(),
		}
	}

	/// A transaction event carrying the timing, trace context and finished
	/// spans of `transaction`.
	pub fn from_transaction(origin: EventOrigin, transaction: &CompletedTransaction) -> Self {
		let mut event = Self::new(origin);
		event.ty = EventType::Transaction;
		event.level = None;
		event.transaction = Some(transaction.name.clone());
		event.start_timestamp = Some(transaction.start.into());
		event.timestamp = transaction.end.into();
		if let Ok(trace) = serde_json::to_value(&transaction.trace) {
			event.contexts.insert("trace".to_string(), trace);
		}
		event.spans = transaction
			.spans
			.iter()
			.filter(|span| span.is_finished())
			.cloned()
			.collect();
		event
	}

	pub fn event_id(&self) -> EventId {
		self.event_id
	}

	pub fn event_type(&self) -> EventType {
		self.ty
	}

	pub fn platform(&self) -> &str {
		&self.platform
	}

	pub fn sdk(&self) -> &SdkInfo {
		&self.sdk
	}

	pub fn server_name(&self) -> Option<&str> {
		self.server_name.as_deref()
	}

	pub fn environment(&self) -> Option<&str> {
		self.environment.as_deref()
	}

	pub fn release(&self) -> Option<&str> {
		self.release.as_deref()
	}

	pub fn request(&self) -> Option<&RequestContext> {
		self.request.as_ref()
	}

	pub fn exception(&self) -> Option<&ExceptionChain> {
		self.exception.as_ref()
	}

	pub fn stacktrace(&self) -> Option<&Stacktrace> {
		self.stacktrace.as_ref()
	}

	pub fn threads(&self) -> Option<&ThreadsSnapshot> {
		self.threads.as_ref()
	}

	pub fn trace_context(&self) -> Option<TraceContext> {
		self.contexts
			.get("trace")
			.and_then(|v| serde_json::from_value(v.clone()).ok())
	}

	/// Sets the level from its textual name (`"warn"` becomes `warning`).
	pub fn set_level_str(&mut self, level: &str) -> Result<()> {
		self.level = Some(level.parse()?);
		Ok(())
	}

	pub fn set_timestamp(&mut self, timestamp: impl Into<Timestamp>) {
		self.timestamp = timestamp.into();
	}

	/// Attaches request context. Returns `false` and leaves the event
	/// untouched if a request is already attached.
	pub fn attach_request(&mut self, request: RequestContext) -> bool {
		if self.request.is_some() {
			return false;
		}
		self.request = Some(request);
		true
	}

	pub fn attach_exception(&mut self, chain: ExceptionChain) {
		self.exception = Some(chain).filter(|c| !c.is_empty());
	}

	pub fn attach_stacktrace(&mut self, stacktrace: Stacktrace) {
		self.stacktrace = Some(stacktrace).filter(|st| !st.is_empty());
	}

	pub fn attach_threads(&mut self, threads: ThreadsSnapshot) {
		self.threads = Some(threads);
	}

	/// Encodes the event as a JSON value.
	pub fn to_value(&self) -> Result<serde_json::Value> {
		Ok(serde_json::to_value(self)?)
	}

	/// Decodes an event previously produced by [`Event::to_value`].
	pub fn from_value(value: serde_json::Value) -> Result<Self> {
		Ok(serde_json::from_value(value)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::exception::{CapturedError, ErrorLink};
	use crate::stacktrace::Frame;
	use proptest::prelude::*;

	fn origin() -> EventOrigin {
		EventOrigin {
			server_name: Some("web-1".to_string()),
			environment: Some("production".to_string()),
			release: Some("1.4.2".to_string()),
			sdk: SdkInfo::default(),
		}
	}

	#[test]
	fn event_id_is_32_hex_digits() {
		let id = EventId::new().to_string();
		assert_eq!(id.len(), 32);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn new_event_defaults() {
		let event = Event::new(origin());
		assert_eq!(event.level, Some(Level::Error));
		assert_eq!(event.event_type(), EventType::Event);
		assert_eq!(event.platform(), PLATFORM);
		assert_eq!(event.environment(), Some("production"));
		assert!(event.message.is_empty());
		assert!(matches!(event.timestamp, Timestamp::Epoch(_)));
	}

	#[test]
	fn minimal_event_serializes_only_set_attributes() {
		let event = Event::new(EventOrigin::default());
		let value = event.to_value().unwrap();
		let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
		keys.sort();
		assert_eq!(
			keys,
			vec!["event_id", "level", "platform", "sdk", "timestamp", "type"]
		);
	}

	#[test]
	fn full_event_roundtrips() {
		let mut event = Event::new(origin());
		event.message = "payment failed".to_string();
		event.tags.insert("region".to_string(), "eu".to_string());
		event.user.insert("id".to_string(), serde_json::json!("u-1"));
		event.fingerprint = vec!["{{ default }}".to_string(), "payments".to_string()];
		event.attach_request(RequestContext {
			url: Some("https://shop.example.com/pay".to_string()),
			method: Some("POST".to_string()),
			..Default::default()
		});
		let captured = CapturedError::new(ErrorLink::new("app::PayError", "card declined"));
		event.attach_exception(ExceptionChain::extract(&captured, |_| Stacktrace::default()));
		event.attach_threads(ThreadsSnapshot::current(
			true,
			Some(Stacktrace {
				frames: vec![Frame {
					function: Some("app::pay".to_string()),
					lineno: Some(7),
					in_app: true,
					..Default::default()
				}],
			}),
		));

		let value = event.to_value().unwrap();
		let encoded = serde_json::to_string(&value).unwrap();
		let decoded = Event::from_value(serde_json::from_str(&encoded).unwrap()).unwrap();
		assert_eq!(decoded, event);

		assert_eq!(value["exception"]["values"][0]["type"], "app::PayError");
		assert_eq!(value["exception"]["values"][0]["module"], "app");
		assert_eq!(value["threads"]["values"][0]["crashed"], true);
		assert_eq!(value["request"]["method"], "POST");
	}

	#[test]
	fn attach_request_only_once() {
		let mut event = Event::new(origin());
		let first = RequestContext {
			method: Some("GET".to_string()),
			..Default::default()
		};
		let second = RequestContext {
			method: Some("DELETE".to_string()),
			..Default::default()
		};
		assert!(event.attach_request(first));
		assert!(!event.attach_request(second));
		assert_eq!(event.request().unwrap().method.as_deref(), Some("GET"));
	}

	#[test]
	fn set_level_str_normalizes_warn() {
		let mut event = Event::new(origin());
		event.set_level_str("warn").unwrap();
		assert_eq!(event.level, Some(Level::Warning));
		assert!(event.set_level_str("loud").is_err());
	}

	#[test]
	fn timestamps_normalize_rich_times() {
		let mut event = Event::new(origin());
		let time = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.5Z")
			.unwrap()
			.with_timezone(&Utc);
		event.set_timestamp(time);
		assert_eq!(event.timestamp, Timestamp::Epoch(1_704_164_645.5));

		event.set_timestamp("2024-01-02T03:04:05Z");
		assert_eq!(event.timestamp, Timestamp::Raw("2024-01-02T03:04:05Z".to_string()));
	}

	#[test]
	fn transaction_event_copies_trace_and_finished_spans() {
		let trace = TraceContext::new("http.server");
		let mut finished = SpanRecord::child_of(&trace, "db.query");
		finished.finish();
		let running = SpanRecord::child_of(&trace, "cache.get");
		let start = Utc::now();
		let transaction = CompletedTransaction {
			name: "GET /orders".to_string(),
			trace: trace.clone(),
			start,
			end: start + chrono::Duration::milliseconds(120),
			spans: vec![finished.clone(), running],
		};

		let event = Event::from_transaction(origin(), &transaction);
		assert_eq!(event.event_type(), EventType::Transaction);
		assert_eq!(event.level, None);
		assert_eq!(event.transaction.as_deref(), Some("GET /orders"));
		assert_eq!(event.spans, vec![finished]);
		assert_eq!(event.trace_context(), Some(trace));
		assert!(event.start_timestamp.is_some());

		let value = event.to_value().unwrap();
		assert_eq!(value["type"], "transaction");
		assert!(value.get("level").is_none());
	}

	proptest! {
		#[test]
		fn tags_and_message_roundtrip(
			message in "[a-zA-Z0-9 ]{0,40}",
			tags in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..6),
		) {
			let mut event = Event::new(origin());
			event.message = message.clone();
			event.tags = tags.clone();

			let value = event.to_value().unwrap();
			let object = value.as_object().unwrap();
			prop_assert_eq!(object.contains_key("message"), !message.is_empty());
			prop_assert_eq!(object.contains_key("tags"), !tags.is_empty());

			let decoded = Event::from_value(value).unwrap();
			prop_assert_eq!(decoded, event);
		}
	}
}
