use crate::config::ChannelConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// Opens the socket of one channel.
///
/// Called once per channel at startup and again every time a channel has to
/// re-join after a socket error. The returned socket must be non-blocking.
pub trait SocketOpener: Send + Sync {
    fn open(&self, channel: &ChannelConfig) -> io::Result<UdpSocket>;
}

/// Joins the channel's multicast group on a specific interface.
#[derive(Debug, Clone)]
pub struct MulticastOpener {
    interface: Ipv4Addr,
    recv_buffer_bytes: usize,
}

impl MulticastOpener {
    /// Creates a new MulticastOpener.
    ///
    /// # Arguments
    ///
    /// * `interface` - Local address of the NIC that receives the feed.
    /// * `recv_buffer_bytes` - Kernel receive buffer requested for each socket.
    pub fn new(interface: Ipv4Addr, recv_buffer_bytes: usize) -> Self {
        Self {
            interface,
            recv_buffer_bytes,
        }
    }
}

impl SocketOpener for MulticastOpener {
    fn open(&self, channel: &ChannelConfig) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        // The kernel may clamp this to its own maximum.
        socket.set_recv_buffer_size(self.recv_buffer_bytes)?;

        socket.bind(&SocketAddr::V4(bind_address(channel)).into())?;
        socket.join_multicast_v4(&channel.group, &self.interface)?;
        // Only the group joined on this socket, not every group joined on the host.
        #[cfg(target_os = "linux")]
        socket.set_multicast_all_v4(false)?;

        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }
}

/// Local address a channel socket binds to.
///
/// On unix the group itself is bound, so the kernel filters out datagrams
/// addressed to other groups that share the port.
pub fn bind_address(channel: &ChannelConfig) -> SocketAddrV4 {
    if cfg!(unix) {
        SocketAddrV4::new(channel.group, channel.port)
    } else {
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, channel.port)
    }
}
