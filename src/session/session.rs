use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::config::UdpPingConfig;
use crate::session::interface::{AddressFamily, InterfaceResolver};
use crate::session::socket::ProbeSocket;

/// A bound and connected socket. A session is never repaired: if anything goes wrong, it is
///  dropped and a new one is opened.
pub struct Session {
    pub socket: Arc<dyn ProbeSocket>,
    pub local_addr: SocketAddr,
}
impl Session {
    /// Binds to the configured interface's address and source port, falling back to an ephemeral
    ///  port once if the configured port is not available, and connects to the destination.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &UdpPingConfig, resolver: &dyn InterfaceResolver) -> anyhow::Result<Session> {
        let family = AddressFamily::of(&config.destination);
        let mut bind_addr = resolver.interface_address(&config.interface, family)
            .with_context(|| format!("interface {} is not available", config.interface))?;
        bind_addr.set_port(config.source_port);

        let socket = Socket::new(Domain::for_address(config.destination), Type::DGRAM, Some(Protocol::UDP))
            .context("error creating socket")?;

        if let Err(e) = socket.bind(&bind_addr.into()) {
            if config.source_port == 0 {
                return Err(e).with_context(|| format!("error binding to {}", bind_addr));
            }
            warn!("error binding to {}, falling back to an ephemeral port: {}", bind_addr, e);
            bind_addr.set_port(0);
            socket.bind(&bind_addr.into())
                .with_context(|| format!("error binding to {}", bind_addr))?;
        }

        socket.connect(&config.destination.into())
            .with_context(|| format!("error connecting to {}", config.destination))?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = socket.local_addr()?;
        info!("session started: {} -> {}", local_addr, config.destination);

        Ok(Session {
            socket: Arc::new(socket),
            local_addr,
        })
    }
}


/// Opens a new session each time the session controller (re)starts probing
#[cfg_attr(test, mockall::automock)]
pub trait SessionOpener: Send + Sync {
    fn open_session(&self, config: &UdpPingConfig) -> anyhow::Result<Session>;
}

/// Binds sessions to the configured interface's current address
pub struct InterfaceSessionOpener {
    resolver: Arc<dyn InterfaceResolver>,
}
impl InterfaceSessionOpener {
    pub fn new(resolver: Arc<dyn InterfaceResolver>) -> InterfaceSessionOpener {
        InterfaceSessionOpener { resolver }
    }
}

impl SessionOpener for InterfaceSessionOpener {
    fn open_session(&self, config: &UdpPingConfig) -> anyhow::Result<Session> {
        Session::open(config, self.resolver.as_ref())
    }
}
