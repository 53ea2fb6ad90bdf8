// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error and event capture SDK for Rust applications.
//!
//! Builds structured events from errors, messages and finished transactions
//! and delivers them to a collector, either on the calling task, through a
//! bounded background queue, or through an application-supplied callback.
//!
//! # Features
//!
//! - **Exception chains**: `source()` chains become root-first records with
//!   each distinct backtrace attached once
//! - **Frame normalization**: project-relative paths, `in_app` flags and
//!   source context lines
//! - **Request context**: filtered headers and opt-in client IP resolution
//! - **Dispatch control**: `before_send` veto, sampling, error exclusion and
//!   environment gating
//!
//! # Example
//!
//! ```ignore
//! use loom_capture::{CaptureClient, ContextScope, DispatchHint, Level};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CaptureClient::new(
//!         CaptureClient::builder()
//!             .dsn("https://key@collector.example.com/42")
//!             .release(env!("CARGO_PKG_VERSION"))
//!             .build()?,
//!     )?;
//!
//!     let scope = ContextScope::default();
//!     scope.set_tag("region", "eu-west-1");
//!
//!     client
//!         .capture_message("cache warmed", Level::Info, &scope, DispatchHint::default())
//!         .await;
//!
//!     client.shutdown(std::time::Duration::from_secs(2)).await;
//!     Ok(())
//! }
//! ```

mod backtrace;
mod builder;
mod client;
mod dsn;
mod error;
mod hint;
mod options;
mod scope;
mod source;
mod transport;
mod worker;

pub use crate::backtrace::{capture_backtrace, BacktraceNormalizer};
pub use builder::EventBuilder;
pub use client::CaptureClient;
pub use dsn::Dsn;
pub use error::{CaptureSdkError, Result};
pub use hint::DispatchHint;
pub use options::{
	AsyncCallback, BeforeSend, BoxError, ClientOptions, ClientOptionsBuilder, ENV_DSN, ENV_ENVIRONMENT,
	ENV_RELEASE, ENV_SERVER_NAME,
};
pub use scope::{ContextScope, NoopScope, Scope, MAX_BREADCRUMBS};
pub use source::{FileContext, LineCache, SourceCache};
pub use transport::{select_transport, HttpTransport, NoopTransport, Transport};
pub use worker::{BackgroundWorker, Job, TokioWorker};

// Re-export core types for convenience
pub use loom_capture_core::{
	AddressResolver, Breadcrumb, CaptureError, CapturedError, CompletedTransaction, ErrorLink, Event,
	EventId, EventType, ExceptionChain, ExceptionRecord, Frame, Level, RawBacktrace, RawFrame,
	RequestContext, RequestEnv, SdkInfo, SpanRecord, Stacktrace, ThreadsSnapshot, Timestamp,
	TraceContext,
};
