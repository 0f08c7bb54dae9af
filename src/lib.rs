//! # rnetconf - NETCONF Client for Network Devices
//!
//! `rnetconf` is a Rust library for managing configuration of network
//! devices over NETCONF (RFC 6241) on SSH (RFC 6242). It opens sessions,
//! exchanges capabilities, issues RPCs concurrently and decodes replies into
//! a generic element tree that can be compared, diffed and merged.
//!
//! ## Features
//!
//! - **Session Engine**: Hello exchange, version negotiation, message-id
//!   correlation with any number of requests in flight
//! - **Framing**: End-of-message (1.0) and chunked (1.1) framing
//! - **Element Tree**: Schema-flexible data with path lookup, structural
//!   diff and edit application
//! - **Capability Gating**: Requests are checked against the peer
//!   capabilities before anything is sent
//! - **Transactions**: Lock, edit, validate and commit on the candidate
//!   datastore with cleanup on failure
//! - **Recording**: JSONL session recordings and offline replay
//! - **Async/Await**: Built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rnetconf::config::SessionConfig;
//! use rnetconf::element::Element;
//! use rnetconf::rpc::{Datastore, Filter};
//! use rnetconf::session::{ConnectionSecurityOptions, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::connect(
//!         "admin",
//!         "192.168.1.1",
//!         830,
//!         "password",
//!         &ConnectionSecurityOptions::default(),
//!         SessionConfig::default(),
//!     )
//!     .await?;
//!
//!     let filter = Filter::subtree(Element::new("interfaces").with_namespace("urn:ietf:params:xml:ns:yang:ietf-interfaces"));
//!     let data = session
//!         .get_config(Datastore::Running, Some(filter))
//!         .await?
//!         .into_data()?;
//!     println!("{data}");
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::Session`] - Session lifecycle, requests and notifications
//! - [`element::Element`] - Generic data tree, [`element::diff`] and [`element::apply_edit`]
//! - [`rpc`] - Request builders and reply decoding
//! - [`codec`] - XML encoding and message framing
//! - [`transport`] - Byte transports, including the SSH subsystem
//! - [`error::NetconfError`] - Error types for sessions and data handling

pub mod capabilities;
pub mod codec;
pub mod config;
pub mod element;
pub mod error;
pub mod rpc;
pub mod session;
pub mod transport;

pub use element::Element;
pub use error::NetconfError;
pub use session::Session;
