//! ONVIF client core in Rust
//!
//! This crate provides the transport layer an ONVIF camera/device-management
//! client is built on:
//!
//! - WS-Discovery multicast probing to locate devices on the local network
//!   with no prior address knowledge
//! - Authenticated download of device resources (snapshots, backups) with
//!   HTTP Basic and RFC 2617 Digest negotiation
//!
//! The per-operation SOAP request/response surface of the protocol sits on
//! top of this layer and is out of scope here.

// Core modules
pub mod auth;
pub mod discovery;
pub mod error;

// Re-export main types for convenience
pub use auth::{AuthenticatedDownloader, Credentials, DigestChallenge, DownloadConfig};
pub use discovery::{available_devices, DiscoveredDevice, DiscoveryFailure, WsDiscovery};
pub use error::{OnvifError, Result};
