// src/net.rs
//! UDP multicast transport. Delivery is datagram-framed, unordered and lossy;
//! everything above this layer compensates. The receiver exposes a bounded
//! poll so the run loop can interleave conflation and stats work, plus a
//! non-blocking drain for the snapshot feed.

use std::cell::Cell;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use tracing::info;

pub struct McastReceiver {
    sock: UdpSocket,
    timeout: Cell<Option<Duration>>,
}

impl McastReceiver {
    /// Binds the port and joins `group` on `interface`.
    pub fn join(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> io::Result<Self> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        sock.join_multicast_v4(&group, &interface)?;
        info!(%group, port, "joined multicast group");
        Ok(Self {
            sock,
            timeout: Cell::new(None),
        })
    }

    /// Waits up to `timeout` for one datagram. `Ok(None)` on timeout.
    pub fn poll(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let timeout = timeout.max(Duration::from_millis(1));
        if self.timeout.get() != Some(timeout) {
            self.sock.set_read_timeout(Some(timeout))?;
            self.timeout.set(Some(timeout));
        }
        map_recv(self.sock.recv(buf))
    }

    /// Switches the socket to non-blocking reads, for feeds drained
    /// opportunistically each loop iteration.
    pub fn into_nonblocking(self) -> io::Result<Self> {
        self.sock.set_nonblocking(true)?;
        Ok(self)
    }

    /// Non-blocking read; `Ok(None)` when nothing is queued.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        map_recv(self.sock.recv(buf))
    }
}

fn map_recv(res: io::Result<usize>) -> io::Result<Option<usize>> {
    match res {
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub struct McastSender {
    sock: UdpSocket,
    dest: SocketAddrV4,
}

impl McastSender {
    pub fn open(group: Ipv4Addr, port: u16, ttl: u32) -> io::Result<Self> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        sock.set_multicast_ttl_v4(ttl)?;
        Ok(Self {
            sock,
            dest: SocketAddrV4::new(group, port),
        })
    }

    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.sock.send_to(data, self.dest)
    }
}
