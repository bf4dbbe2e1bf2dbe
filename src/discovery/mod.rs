//! WS-Discovery device discovery
//!
//! Locates ONVIF devices on the local network with a multicast probe and
//! collects their ProbeMatch responses within a bounded time budget.

pub mod interface;
pub mod network;
pub mod probe;

// Re-export main types for convenience
pub use interface::{resolve_interface, InterfaceSource, NetworkInterfaceInfo, SystemInterfaces};
pub use network::{available_devices, DiscoveryFailure, WsDiscovery, WS_DISCOVERY_GROUP};
pub use probe::{DiscoveredDevice, DEFAULT_PROBE_TYPES};
