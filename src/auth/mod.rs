//! Authenticated transport for device resources
//!
//! HTTP Basic and RFC 2617 Digest negotiation for fetching snapshot images
//! and backup bundles from devices.

pub mod digest;
pub mod download;

// Re-export main types for convenience
pub use digest::{digest_response, DigestChallenge, DigestState};
pub use download::{AuthenticatedDownloader, Credentials, DownloadConfig};
