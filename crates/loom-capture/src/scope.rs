// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ambient context applied to events before dispatch.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use loom_capture_core::{Breadcrumb, Event, Level};
use serde_json::{Map, Value};

use crate::hint::DispatchHint;

/// Maximum number of breadcrumbs to keep.
pub const MAX_BREADCRUMBS: usize = 100;

/// Something that enriches an event with ambient context.
pub trait Scope: Send + Sync {
	fn apply_to_event(&self, event: &mut Event, hint: &DispatchHint);
}

/// A scope that adds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScope;

impl Scope for NoopScope {
	fn apply_to_event(&self, _event: &mut Event, _hint: &DispatchHint) {}
}

#[derive(Debug, Default)]
struct ScopeData {
	user: Map<String, Value>,
	tags: BTreeMap<String, String>,
	extra: Map<String, Value>,
	contexts: Map<String, Value>,
	fingerprint: Vec<String>,
	level: Option<Level>,
	transaction: Option<String>,
	breadcrumbs: VecDeque<Breadcrumb>,
}

/// User, tags, extra data, contexts and breadcrumbs shared across captures.
///
/// Values already present on the event take precedence over scope values,
/// except for `level`, which overrides when set on the scope. Scope
/// breadcrumbs are placed before the event's own.
#[derive(Debug)]
pub struct ContextScope {
	data: RwLock<ScopeData>,
	max_breadcrumbs: usize,
}

impl Default for ContextScope {
	fn default() -> Self {
		Self::new(MAX_BREADCRUMBS)
	}
}

impl ContextScope {
	pub fn new(max_breadcrumbs: usize) -> Self {
		Self {
			data: RwLock::new(ScopeData::default()),
			max_breadcrumbs,
		}
	}

	fn read(&self) -> RwLockReadGuard<'_, ScopeData> {
		match self.data.read() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	fn write(&self) -> RwLockWriteGuard<'_, ScopeData> {
		match self.data.write() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	pub fn set_user(&self, user: Map<String, Value>) {
		self.write().user = user;
	}

	pub fn clear_user(&self) {
		self.write().user.clear();
	}

	pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
		self.write().tags.insert(key.into(), value.into());
	}

	pub fn remove_tag(&self, key: &str) {
		self.write().tags.remove(key);
	}

	pub fn set_extra(&self, key: impl Into<String>, value: Value) {
		self.write().extra.insert(key.into(), value);
	}

	pub fn set_context(&self, key: impl Into<String>, value: Value) {
		self.write().contexts.insert(key.into(), value);
	}

	pub fn set_fingerprint(&self, fingerprint: Vec<String>) {
		self.write().fingerprint = fingerprint;
	}

	pub fn set_level(&self, level: Option<Level>) {
		self.write().level = level;
	}

	pub fn set_transaction(&self, name: Option<String>) {
		self.write().transaction = name;
	}

	/// Adds a breadcrumb to the trail, dropping the oldest past the limit.
	pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
		let mut data = self.write();
		data.breadcrumbs.push_back(breadcrumb);
		while data.breadcrumbs.len() > self.max_breadcrumbs {
			data.breadcrumbs.pop_front();
		}
	}

	pub fn clear_breadcrumbs(&self) {
		self.write().breadcrumbs.clear();
	}

	pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
		self.read().breadcrumbs.iter().cloned().collect()
	}

	pub fn clear(&self) {
		*self.write() = ScopeData::default();
	}
}

fn merge_missing(target: &mut Map<String, Value>, source: &Map<String, Value>) {
	for (key, value) in source {
		if !target.contains_key(key) {
			target.insert(key.clone(), value.clone());
		}
	}
}

impl Scope for ContextScope {
	fn apply_to_event(&self, event: &mut Event, _hint: &DispatchHint) {
		let data = self.read();

		merge_missing(&mut event.user, &data.user);
		merge_missing(&mut event.extra, &data.extra);
		merge_missing(&mut event.contexts, &data.contexts);
		for (key, value) in &data.tags {
			event.tags.entry(key.clone()).or_insert_with(|| value.clone());
		}

		if event.fingerprint.is_empty() {
			event.fingerprint = data.fingerprint.clone();
		}
		if event.level.is_some() {
			if let Some(level) = data.level {
				event.level = Some(level);
			}
		}
		if event.transaction.is_none() {
			event.transaction = data.transaction.clone();
		}

		if !data.breadcrumbs.is_empty() {
			let own = std::mem::take(&mut event.breadcrumbs.values);
			let mut merged: Vec<Breadcrumb> = data.breadcrumbs.iter().cloned().collect();
			merged.extend(own);
			let excess = merged.len().saturating_sub(self.max_breadcrumbs);
			merged.drain(..excess);
			event.breadcrumbs.values = merged;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_capture_core::{CompletedTransaction, EventOrigin, SdkInfo, TraceContext};
	use serde_json::json;

	fn event() -> Event {
		Event::new(EventOrigin {
			server_name: None,
			environment: None,
			release: None,
			sdk: SdkInfo::default(),
		})
	}

	#[test]
	fn test_event_values_win() {
		let scope = ContextScope::default();
		scope.set_tag("region", "eu");
		scope.set_tag("shard", "3");
		scope.set_extra("attempt", json!(1));

		let mut event = event();
		event.tags.insert("region".to_string(), "us".to_string());
		scope.apply_to_event(&mut event, &DispatchHint::default());

		assert_eq!(event.tags["region"], "us");
		assert_eq!(event.tags["shard"], "3");
		assert_eq!(event.extra["attempt"], json!(1));
	}

	#[test]
	fn test_scope_level_overrides() {
		let scope = ContextScope::default();
		scope.set_level(Some(Level::Warning));
		let mut event = event();
		scope.apply_to_event(&mut event, &DispatchHint::default());
		assert_eq!(event.level, Some(Level::Warning));
	}

	#[test]
	fn test_transactions_stay_levelless() {
		let scope = ContextScope::default();
		scope.set_level(Some(Level::Warning));
		let now = chrono::Utc::now();
		let mut event = Event::from_transaction(
			EventOrigin {
				server_name: None,
				environment: None,
				release: None,
				sdk: SdkInfo::default(),
			},
			&CompletedTransaction {
				name: "GET /".to_string(),
				trace: TraceContext::new("http.server"),
				start: now,
				end: now,
				spans: Vec::new(),
			},
		);
		scope.apply_to_event(&mut event, &DispatchHint::default());
		assert_eq!(event.level, None);
	}

	#[test]
	fn test_breadcrumbs_trimmed() {
		let scope = ContextScope::new(3);
		for i in 0..5 {
			scope.add_breadcrumb(Breadcrumb::new("test", format!("crumb {i}")));
		}
		let crumbs = scope.breadcrumbs();
		assert_eq!(crumbs.len(), 3);
		assert_eq!(crumbs[0].message.as_deref(), Some("crumb 2"));

		let mut event = event();
		event
			.breadcrumbs
			.values
			.push(Breadcrumb::new("event", "own crumb"));
		scope.apply_to_event(&mut event, &DispatchHint::default());

		let messages: Vec<_> = event
			.breadcrumbs
			.values
			.iter()
			.filter_map(|b| b.message.as_deref())
			.collect();
		assert_eq!(messages, vec!["crumb 3", "crumb 4", "own crumb"]);
	}

	#[test]
	fn test_clear_resets_everything() {
		let scope = ContextScope::default();
		scope.set_tag("a", "b");
		scope.add_breadcrumb(Breadcrumb::default());
		scope.clear();

		let mut event = event();
		scope.apply_to_event(&mut event, &DispatchHint::default());
		assert!(event.tags.is_empty());
		assert!(event.breadcrumbs.values.is_empty());
	}
}
