//! # linode-api
//!
//! Blocking, typed access to the Linode v4 REST API.
//!
//! This crate provides:
//! - The [`CloudClient`] trait covering domains, domain records, firewalls,
//!   firewall devices, instance IPs, reserved IPs and account events
//! - [`HttpClient`], a `ureq`-backed implementation with bearer auth,
//!   `X-Filter` support, full-page list consumption and retry with backoff
//! - [`MockClient`], an in-memory fake that journals calls and supports
//!   error injection
//! - [`CancelToken`], threaded through every call so that cancellation and
//!   deadlines reach request timeouts, retry backoff and polling sleeps
//!
//! ## Example
//!
//! ```no_run
//! use linode_api::{CancelToken, CloudClient, HttpClient, HttpConfig};
//!
//! let client = HttpClient::new(HttpConfig::new("my-token")).expect("valid config");
//! let cancel = CancelToken::new();
//! for domain in client.list_domains(&cancel, None).expect("list domains") {
//!     println!("{} {}", domain.id, domain.domain);
//! }
//! ```

#![warn(clippy::all)]

pub mod cancel;
pub mod client;
pub mod error;
pub mod filter;
pub mod http;
pub mod mock;
pub mod retry;
pub mod types;

pub use cancel::CancelToken;
pub use client::CloudClient;
pub use error::{Error, ErrorCategory, Result};
pub use filter::{Filter, Order};
pub use http::{DEFAULT_API_URL, HttpClient, HttpConfig};
pub use mock::MockClient;
pub use retry::RetryConfig;
