// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client IP resolution from a request environment.

use std::net::{IpAddr, SocketAddr};

use crate::request::RequestEnv;

/// Resolves the originating client address of a request.
///
/// Proxy-supplied headers can be forged by the client, so they are only
/// consulted when the resolver is built with `trust_proxy_headers`.
/// Precedence: `Client-Ip`, `X-Real-Ip`, first address of `X-Forwarded-For`,
/// then the socket peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver {
	trust_proxy_headers: bool,
}

impl AddressResolver {
	pub fn new(trust_proxy_headers: bool) -> Self {
		Self { trust_proxy_headers }
	}

	pub fn trusts_proxy_headers(&self) -> bool {
		self.trust_proxy_headers
	}

	pub fn resolve(&self, env: &RequestEnv) -> Option<IpAddr> {
		if self.trust_proxy_headers {
			let forwarded = env
				.get("HTTP_CLIENT_IP")
				.and_then(parse_ip)
				.or_else(|| env.get("HTTP_X_REAL_IP").and_then(parse_ip))
				.or_else(|| {
					env.get("HTTP_X_FORWARDED_FOR")
						.and_then(|chain| chain.split(',').find_map(parse_ip))
				});
			if forwarded.is_some() {
				return forwarded;
			}
		}

		env.get("REMOTE_ADDR").and_then(parse_ip)
	}
}

/// Parses a bare address or a `host:port` socket address.
fn parse_ip(raw: &str) -> Option<IpAddr> {
	let raw = raw.trim();
	if raw.is_empty() {
		return None;
	}
	raw.parse::<IpAddr>()
		.ok()
		.or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn full_env() -> RequestEnv {
		RequestEnv::new()
			.with("HTTP_CLIENT_IP", "1.1.1.1")
			.with("HTTP_X_REAL_IP", "2.2.2.2")
			.with("HTTP_X_FORWARDED_FOR", "3.3.3.3,4.4.4.4")
			.with("REMOTE_ADDR", "5.5.5.5")
	}

	fn ip(s: &str) -> Option<IpAddr> {
		Some(s.parse().unwrap())
	}

	#[test]
	fn precedence_when_proxies_are_trusted() {
		let resolver = AddressResolver::new(true);
		let mut env = full_env();
		assert_eq!(resolver.resolve(&env), ip("1.1.1.1"));

		env.remove("HTTP_CLIENT_IP");
		assert_eq!(resolver.resolve(&env), ip("2.2.2.2"));

		env.remove("HTTP_X_REAL_IP");
		assert_eq!(resolver.resolve(&env), ip("3.3.3.3"));

		env.remove("HTTP_X_FORWARDED_FOR");
		assert_eq!(resolver.resolve(&env), ip("5.5.5.5"));
	}

	#[test]
	fn untrusted_headers_are_ignored() {
		let resolver = AddressResolver::new(false);
		assert_eq!(resolver.resolve(&full_env()), ip("5.5.5.5"));
	}

	#[test]
	fn empty_env_yields_none() {
		assert_eq!(AddressResolver::new(true).resolve(&RequestEnv::new()), None);
	}

	#[test]
	fn garbage_values_are_skipped() {
		let env = RequestEnv::new()
			.with("HTTP_CLIENT_IP", "unknown")
			.with("HTTP_X_FORWARDED_FOR", " , 198.51.100.4 ")
			.with("REMOTE_ADDR", "5.5.5.5");
		assert_eq!(AddressResolver::new(true).resolve(&env), ip("198.51.100.4"));
	}

	#[test]
	fn remote_addr_with_port() {
		let env = RequestEnv::new().with("REMOTE_ADDR", "[2001:db8::1]:443");
		assert_eq!(AddressResolver::new(false).resolve(&env), ip("2001:db8::1"));
	}
}
