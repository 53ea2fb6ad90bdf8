// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom capture SDK.
//!
//! This crate holds the event record sent to the collector and the pure
//! transforms used to build it. It performs no I/O and is shared by the
//! client SDK (`loom-capture`) and anything that needs to decode its payloads.
//!
//! # Overview
//!
//! - [`Event`]: the record itself, with presence-checked serialization
//! - [`ExceptionChain`]: root-cause-first error chains with backtrace dedup
//! - [`AddressResolver`]: client IP resolution from a [`RequestEnv`]
//! - [`RequestContext`], [`ThreadsSnapshot`], [`TraceContext`]: sub-records
//! - [`RawBacktrace`] / [`Stacktrace`]: frames before and after normalization

pub mod address;
pub mod breadcrumb;
pub mod context;
pub mod error;
pub mod event;
pub mod exception;
pub mod level;
pub mod request;
pub mod stacktrace;
pub mod transaction;

pub use address::AddressResolver;
pub use breadcrumb::Breadcrumb;
pub use context::{SdkInfo, ThreadInfo, ThreadsSnapshot, TraceContext, SDK_NAME, SDK_VERSION};
pub use error::{CaptureError, Result};
pub use event::{epoch_seconds, Event, EventId, EventOrigin, EventType, Timestamp, Values, PLATFORM};
pub use exception::{module_from_type, CapturedError, ErrorLink, ExceptionChain, ExceptionRecord};
pub use level::Level;
pub use request::{RequestContext, RequestEnv};
pub use stacktrace::{BacktraceId, CallOrder, Frame, RawBacktrace, RawFrame, Stacktrace};
pub use transaction::{CompletedTransaction, SpanRecord};
