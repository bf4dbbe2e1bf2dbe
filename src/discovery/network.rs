//! WS-Discovery probe engine
//!
//! Sends one multicast probe on the well-known discovery group and collects
//! ProbeMatch responses until the time budget elapses or the caller cancels.
//! Discovery is best-effort over a shared, unreliable channel: bad packets
//! are noise, zero responses is a successful empty result, and a hard
//! deadline bounds the wait.

use crate::discovery::interface::{
    resolve_interface, InterfaceSource, NetworkInterfaceInfo, SystemInterfaces,
};
use crate::discovery::probe::{build_probe, parse_probe_match, DiscoveredDevice, DEFAULT_PROBE_TYPES};
use crate::error::{OnvifError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Well-known WS-Discovery multicast group
pub const WS_DISCOVERY_GROUP: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

/// A discovery run that was cut short, carrying whatever was collected
/// before the interruption alongside the cause.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DiscoveryFailure {
    /// Devices collected before the run was interrupted
    pub partial: Vec<DiscoveredDevice>,
    /// The interruption cause (cancellation, socket error, resolution error)
    #[source]
    pub error: OnvifError,
}

impl DiscoveryFailure {
    fn new(partial: Vec<DiscoveredDevice>, error: OnvifError) -> Self {
        Self { partial, error }
    }

    fn fatal(error: OnvifError) -> Self {
        Self::new(Vec::new(), error)
    }
}

/// WS-Discovery client for locating devices on the local network
pub struct WsDiscovery {
    timeout: Duration,
    interface: Option<String>,
    types: String,
    target: SocketAddrV4,
    source: Arc<dyn InterfaceSource>,
}

impl WsDiscovery {
    /// Create a discovery client with the given receive time budget
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interface: None,
            types: DEFAULT_PROBE_TYPES.to_string(),
            target: WS_DISCOVERY_GROUP,
            source: Arc::new(SystemInterfaces),
        }
    }

    /// Probe on a specific interface, named by OS name or assigned IP
    pub fn with_interface<S: Into<String>>(mut self, spec: S) -> Self {
        self.interface = Some(spec.into());
        self
    }

    /// Override the probed device types (default `dn:NetworkVideoTransmitter`)
    pub fn with_types<S: Into<String>>(mut self, types: S) -> Self {
        self.types = types.into();
        self
    }

    /// Substitute the interface enumeration source (tests)
    #[allow(dead_code)]
    pub(crate) fn with_interface_source(mut self, source: Arc<dyn InterfaceSource>) -> Self {
        self.source = source;
        self
    }

    /// Send one probe and collect deduplicated responses.
    ///
    /// Returns the collected devices when the deadline elapses. Cancellation
    /// and socket errors interrupt the run and return the partial results
    /// inside [`DiscoveryFailure`]. Result order is unspecified.
    pub async fn probe(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<DiscoveredDevice>, DiscoveryFailure> {
        let iface = match &self.interface {
            Some(spec) => match resolve_interface(spec, self.source.as_ref()) {
                Ok(iface) => Some(iface),
                Err(e) => return Err(DiscoveryFailure::fatal(e)),
            },
            None => None,
        };

        let socket = match self.open_socket(iface.as_ref()) {
            Ok(socket) => socket,
            Err(e) => return Err(DiscoveryFailure::fatal(e)),
        };

        let message_id = Uuid::new_v4();
        let envelope = build_probe(&message_id, &self.types);
        if let Err(e) = socket.send_to(envelope.as_bytes(), self.target).await {
            return Err(DiscoveryFailure::fatal(e.into()));
        }
        debug!(%message_id, target = %self.target, "sent WS-Discovery probe");

        let deadline = Instant::now() + self.timeout;
        let mut found: HashMap<String, DiscoveredDevice> = HashMap::new();
        let mut buf = vec![0u8; 8192];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(collected = found.len(), "discovery cancelled by caller");
                    return Err(DiscoveryFailure::new(
                        found.into_values().collect(),
                        OnvifError::cancelled("discovery cancelled by caller"),
                    ));
                }

                _ = sleep_until(deadline) => {
                    info!(collected = found.len(), "discovery window closed");
                    return Ok(found.into_values().collect());
                }

                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => match parse_probe_match(&buf[..len], &message_id) {
                        Some(device) => {
                            debug!(%from, endpoint = %device.endpoint_reference, "probe match");
                            // First response wins; repeats from the same
                            // device are announcements, not new devices.
                            found.entry(device.endpoint_reference.clone()).or_insert(device);
                        }
                        None => debug!(%from, "ignoring unrelated datagram"),
                    },
                    Err(e) => {
                        warn!(collected = found.len(), "discovery socket error: {e}");
                        return Err(DiscoveryFailure::new(found.into_values().collect(), e.into()));
                    }
                },
            }
        }
    }

    /// Build the UDP socket for the probe, joining the discovery group when
    /// the target is multicast. The socket is owned by the calling frame and
    /// released on every exit path when it drops.
    fn open_socket(&self, iface: Option<&NetworkInterfaceInfo>) -> Result<UdpSocket> {
        let local_ip = match iface {
            Some(iface) => iface.ipv4_addr().ok_or_else(|| {
                OnvifError::discovery(format!(
                    "interface {} has no usable IPv4 address",
                    iface.name
                ))
            })?,
            None => Ipv4Addr::UNSPECIFIED,
        };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::from(SocketAddrV4::new(local_ip, 0)).into())?;

        if self.target.ip().is_multicast() {
            socket.join_multicast_v4(self.target.ip(), &local_ip)?;
            socket.set_multicast_if_v4(&local_ip)?;
        }

        Ok(UdpSocket::from_std(socket.into())?)
    }
}

/// Probe once with a fresh cancellation scope and return whatever devices
/// answered within `timeout`, optionally restricted to one interface.
pub async fn available_devices(
    timeout: Duration,
    interface: Option<&str>,
) -> std::result::Result<Vec<DiscoveredDevice>, DiscoveryFailure> {
    let mut engine = WsDiscovery::new(timeout);
    if let Some(spec) = interface {
        engine = engine.with_interface(spec);
    }
    engine.probe(&CancellationToken::new()).await
}
