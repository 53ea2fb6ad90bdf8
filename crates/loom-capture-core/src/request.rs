// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Inbound request environment and the request context derived from it.

use http::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Environment keys that may carry a request correlation id.
pub const REQUEST_ID_KEYS: &[&str] = &["HTTP_X_REQUEST_ID", "action_dispatch.request_id"];

/// Headers that reveal the client address; kept only when PII is allowed.
const IP_HEADER_KEYS: &[&str] = &["HTTP_CLIENT_IP", "HTTP_X_REAL_IP", "HTTP_X_FORWARDED_FOR"];

/// A CGI-style request environment (`REQUEST_METHOD`, `PATH_INFO`, `HTTP_*`, `REMOTE_ADDR`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnv {
	vars: BTreeMap<String, String>,
}

impl RequestEnv {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.vars.insert(key.into(), value.into());
	}

	pub fn remove(&mut self, key: &str) -> Option<String> {
		self.vars.remove(key)
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.vars.get(key).map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.vars.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// The request correlation id, if any header carries one.
	pub fn request_id(&self) -> Option<&str> {
		REQUEST_ID_KEYS
			.iter()
			.filter_map(|key| self.get(key))
			.map(str::trim)
			.find(|id| !id.is_empty())
	}

	/// Builds an environment from `http` request parts.
	pub fn from_http(
		method: &Method,
		uri: &Uri,
		headers: &HeaderMap,
		remote_addr: Option<SocketAddr>,
	) -> Self {
		let mut env = Self::new();
		env.insert("REQUEST_METHOD", method.as_str());
		env.insert("PATH_INFO", uri.path());
		if let Some(query) = uri.query() {
			env.insert("QUERY_STRING", query);
		}
		if uri.scheme_str() == Some("https") {
			env.insert("HTTPS", "on");
		}
		if let Some(host) = uri.host() {
			env.insert("SERVER_NAME", host);
		}
		if let Some(port) = uri.port_u16() {
			env.insert("SERVER_PORT", port.to_string());
		}

		for name in headers.keys() {
			let value = headers
				.get_all(name)
				.iter()
				.filter_map(|v| v.to_str().ok())
				.collect::<Vec<_>>()
				.join(", ");
			let key = name.as_str().to_ascii_uppercase().replace('-', "_");
			let key = match key.as_str() {
				"CONTENT_TYPE" | "CONTENT_LENGTH" => key,
				_ => format!("HTTP_{key}"),
			};
			env.insert(key, value);
		}

		if let Some(addr) = remote_addr {
			env.insert("REMOTE_ADDR", addr.ip().to_string());
		}
		env
	}
}

impl<K, V> FromIterator<(K, V)> for RequestEnv
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
		}
	}
}

/// HTTP request context attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub query_string: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub cookies: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub env: BTreeMap<String, String>,
}

impl RequestContext {
	/// Derives the request context from an environment.
	///
	/// Cookies, the remote address and IP-bearing headers are only kept when
	/// `send_pii` is set.
	pub fn from_env(env: &RequestEnv, send_pii: bool) -> Self {
		let query_string = env
			.get("QUERY_STRING")
			.filter(|q| !q.is_empty())
			.map(str::to_string);

		let mut context = Self {
			url: request_url(env),
			method: env.get("REQUEST_METHOD").map(str::to_string),
			query_string,
			headers: filter_headers(env, send_pii),
			..Default::default()
		};

		for key in ["SERVER_NAME", "SERVER_PORT"] {
			if let Some(value) = env.get(key) {
				context.env.insert(key.to_string(), value.to_string());
			}
		}

		if send_pii {
			if let Some(addr) = env.get("REMOTE_ADDR") {
				context.env.insert("REMOTE_ADDR".to_string(), addr.to_string());
			}
			if let Some(cookie) = env.get("HTTP_COOKIE") {
				context.cookies = parse_cookies(cookie);
			}
		}

		context
	}
}

fn request_url(env: &RequestEnv) -> Option<String> {
	let host = match env.get("HTTP_HOST") {
		Some(host) => host.to_string(),
		None => {
			let name = env.get("SERVER_NAME")?;
			match env.get("SERVER_PORT") {
				Some(port) if port != "80" && port != "443" => format!("{name}:{port}"),
				_ => name.to_string(),
			}
		}
	};
	let scheme = match env.get("HTTPS") {
		Some("on") | Some("1") => "https",
		_ => "http",
	};
	let script = env.get("SCRIPT_NAME").unwrap_or_default();
	let path = env.get("PATH_INFO").unwrap_or_default();
	Some(format!("{scheme}://{host}{script}{path}"))
}

fn filter_headers(env: &RequestEnv, send_pii: bool) -> BTreeMap<String, String> {
	let protocol = env.get("SERVER_PROTOCOL");
	env.iter()
		.filter(|(key, _)| key.to_ascii_uppercase() == *key)
		.filter(|(key, value)| !(*key == "HTTP_VERSION" && Some(*value) == protocol))
		.filter(|(key, _)| *key != "HTTP_COOKIE")
		.filter(|(key, _)| send_pii || !IP_HEADER_KEYS.contains(key))
		.filter_map(|(key, value)| {
			let name = match key {
				"CONTENT_TYPE" | "CONTENT_LENGTH" => key,
				_ => key.strip_prefix("HTTP_")?,
			};
			Some((header_case(name), value.to_string()))
		})
		.collect()
}

/// `X_FORWARDED_FOR` -> `X-Forwarded-For`
fn header_case(name: &str) -> String {
	name.split('_')
		.map(|part| {
			let lower = part.to_ascii_lowercase();
			let mut chars = lower.chars();
			match chars.next() {
				Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join("-")
}

fn parse_cookies(header: &str) -> BTreeMap<String, String> {
	header
		.split(';')
		.filter_map(|pair| {
			let (name, value) = pair.split_once('=')?;
			let name = name.trim();
			(!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_env() -> RequestEnv {
		RequestEnv::new()
			.with("REQUEST_METHOD", "POST")
			.with("PATH_INFO", "/api/orders")
			.with("QUERY_STRING", "page=2")
			.with("HTTP_HOST", "shop.example.com")
			.with("HTTP_USER_AGENT", "curl/8.0")
			.with("HTTP_X_FORWARDED_FOR", "203.0.113.9")
			.with("HTTP_COOKIE", "session=abc; theme=dark")
			.with("CONTENT_TYPE", "application/json")
			.with("REMOTE_ADDR", "10.0.0.1")
			.with("rack.version", "3")
	}

	#[test]
	fn derives_url_method_and_query() {
		let context = RequestContext::from_env(&sample_env(), false);
		assert_eq!(context.url.as_deref(), Some("http://shop.example.com/api/orders"));
		assert_eq!(context.method.as_deref(), Some("POST"));
		assert_eq!(context.query_string.as_deref(), Some("page=2"));
	}

	#[test]
	fn headers_are_filtered_without_pii() {
		let context = RequestContext::from_env(&sample_env(), false);
		assert_eq!(context.headers.get("User-Agent").map(String::as_str), Some("curl/8.0"));
		assert_eq!(
			context.headers.get("Content-Type").map(String::as_str),
			Some("application/json")
		);
		assert!(!context.headers.contains_key("Cookie"));
		assert!(!context.headers.contains_key("X-Forwarded-For"));
		assert!(context.cookies.is_empty());
		assert!(!context.env.contains_key("REMOTE_ADDR"));
	}

	#[test]
	fn pii_keeps_address_and_cookies() {
		let context = RequestContext::from_env(&sample_env(), true);
		assert_eq!(
			context.headers.get("X-Forwarded-For").map(String::as_str),
			Some("203.0.113.9")
		);
		assert_eq!(context.cookies.get("theme").map(String::as_str), Some("dark"));
		assert_eq!(context.env.get("REMOTE_ADDR").map(String::as_str), Some("10.0.0.1"));
	}

	#[test]
	fn url_falls_back_to_server_name() {
		let env = RequestEnv::new()
			.with("SERVER_NAME", "internal")
			.with("SERVER_PORT", "8080")
			.with("HTTPS", "on")
			.with("PATH_INFO", "/health");
		let context = RequestContext::from_env(&env, false);
		assert_eq!(context.url.as_deref(), Some("https://internal:8080/health"));
	}

	#[test]
	fn request_id_lookup() {
		let env = RequestEnv::new().with("HTTP_X_REQUEST_ID", "req-42");
		assert_eq!(env.request_id(), Some("req-42"));
		assert_eq!(RequestEnv::new().request_id(), None);
	}

	#[test]
	fn from_http_parts() {
		let mut headers = HeaderMap::new();
		headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());
		headers.insert("content-type", "text/plain".parse().unwrap());
		let uri: Uri = "https://api.example.com:8443/v1/items?limit=5".parse().unwrap();
		let remote: SocketAddr = "192.0.2.10:51000".parse().unwrap();

		let env = RequestEnv::from_http(&Method::GET, &uri, &headers, Some(remote));
		assert_eq!(env.get("REQUEST_METHOD"), Some("GET"));
		assert_eq!(env.get("PATH_INFO"), Some("/v1/items"));
		assert_eq!(env.get("QUERY_STRING"), Some("limit=5"));
		assert_eq!(env.get("HTTPS"), Some("on"));
		assert_eq!(env.get("SERVER_PORT"), Some("8443"));
		assert_eq!(env.get("HTTP_X_REAL_IP"), Some("198.51.100.7"));
		assert_eq!(env.get("CONTENT_TYPE"), Some("text/plain"));
		assert_eq!(env.get("REMOTE_ADDR"), Some("192.0.2.10"));
	}

	#[test]
	fn header_case_conversion() {
		assert_eq!(header_case("X_FORWARDED_FOR"), "X-Forwarded-For");
		assert_eq!(header_case("USER_AGENT"), "User-Agent");
	}
}
