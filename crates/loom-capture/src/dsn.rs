// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collector DSN parsing: `{scheme}://{public_key}@{host}[:port][/path]/{project_id}`.

use reqwest::Url;
use std::fmt;
use std::str::FromStr;

use crate::error::CaptureSdkError;

/// Where and as whom events are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
	scheme: String,
	public_key: String,
	host: String,
	port: Option<u16>,
	path: String,
	project_id: String,
}

impl Dsn {
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	pub fn public_key(&self) -> &str {
		&self.public_key
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> Option<u16> {
		self.port
	}

	pub fn project_id(&self) -> &str {
		&self.project_id
	}

	/// Whether events for this DSN can be delivered over HTTP.
	pub fn is_http(&self) -> bool {
		matches!(self.scheme.as_str(), "http" | "https")
	}

	/// The collector endpoint events are posted to.
	pub fn store_url(&self) -> String {
		let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
		format!(
			"{}://{}{}{}/api/{}/store/",
			self.scheme, self.host, port, self.path, self.project_id
		)
	}
}

impl FromStr for Dsn {
	type Err = CaptureSdkError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = |reason: &str| CaptureSdkError::InvalidDsn(format!("{reason}: {s}"));

		let url = Url::parse(s.trim()).map_err(|_| invalid("not a URL"))?;
		let public_key = url.username();
		if public_key.is_empty() {
			return Err(invalid("missing public key"));
		}
		let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

		let segments: Vec<&str> = url
			.path_segments()
			.map(|segments| segments.filter(|seg| !seg.is_empty()).collect())
			.unwrap_or_default();
		let (project_id, prefix) = segments
			.split_last()
			.ok_or_else(|| invalid("missing project id"))?;
		let path = prefix.iter().map(|seg| format!("/{seg}")).collect::<String>();

		Ok(Self {
			scheme: url.scheme().to_string(),
			public_key: public_key.to_string(),
			host: host.to_string(),
			port: url.port(),
			path,
			project_id: project_id.to_string(),
		})
	}
}

impl fmt::Display for Dsn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
		write!(
			f,
			"{}://{}@{}{}{}/{}",
			self.scheme, self.public_key, self.host, port, self.path, self.project_id
		)
	}
}
