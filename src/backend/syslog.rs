//! Syslog backend: classic BSD framing over TCP, UDP, or a Unix stream.
//!
//! Wire form is `<PRI>TAG: MSG\n` with `PRI = facility*8 + severity`,
//! 0 ≤ PRI ≤ 191.

use std::io::{self, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::backend::{Backend, BackendKind, BackendStats, closed_error};
use crate::errors::{OmniError, Result};

/// Highest valid PRI value (facility 23, severity 7).
pub const MAX_PRIORITY: u8 = 191;
/// facility USER (1) * 8 + severity INFO (6).
pub const DEFAULT_PRIORITY: u8 = 14;
/// Tag used when the URI does not carry one.
pub const DEFAULT_TAG: &str = "omni";

/// The stream beneath a syslog backend.
enum Transport {
    Tcp(BufWriter<TcpStream>),
    Udp(UdpSocket, SocketAddr),
    #[cfg(unix)]
    Unix(BufWriter<UnixStream>),
}

impl Transport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.write_all(frame),
            Transport::Udp(socket, addr) => socket.send_to(frame, *addr).map(|_| ()),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write_all(frame),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            Transport::Udp(_, _) => Ok(()),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
        }
    }
}

/// Network sink speaking the classic BSD syslog form.
pub struct SyslogBackend {
    transport: Option<Transport>,
    priority: u8,
    tag: String,
    stats: BackendStats,
}

impl SyslogBackend {
    /// Connect over TCP. `priority` must be within 0..=191.
    pub fn tcp(host: &str, port: u16, tag: &str, priority: u8) -> Result<SyslogBackend> {
        let stream = TcpStream::connect((host, port))
            .map_err(|e| OmniError::BackendWrite(format!("syslog connect {host}:{port}: {e}")))?;
        Self::with_transport(Transport::Tcp(BufWriter::new(stream)), tag, priority)
    }

    /// Bind an unconnected UDP socket aimed at `addr`.
    pub fn udp(addr: impl ToSocketAddrs, tag: &str, priority: u8) -> Result<SyslogBackend> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| OmniError::BackendWrite(format!("syslog resolve: {e}")))?
            .next()
            .ok_or_else(|| OmniError::BackendWrite("syslog resolve: no address".into()))?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| OmniError::BackendWrite(format!("syslog udp bind: {e}")))?;
        Self::with_transport(Transport::Udp(socket, addr), tag, priority)
    }

    /// Connect to a Unix stream socket, e.g. `/dev/log`.
    #[cfg(unix)]
    pub fn unix(path: &Path, tag: &str, priority: u8) -> Result<SyslogBackend> {
        let stream = UnixStream::connect(path).map_err(|e| {
            OmniError::BackendWrite(format!("syslog connect {}: {e}", path.display()))
        })?;
        Self::with_transport(Transport::Unix(BufWriter::new(stream)), tag, priority)
    }

    fn with_transport(transport: Transport, tag: &str, priority: u8) -> Result<SyslogBackend> {
        if priority > MAX_PRIORITY {
            return Err(OmniError::ConfigInvalid(format!(
                "syslog priority {priority} out of range 0..={MAX_PRIORITY}"
            )));
        }
        Ok(SyslogBackend {
            transport: Some(transport),
            priority,
            tag: if tag.is_empty() {
                DEFAULT_TAG.to_string()
            } else {
                tag.to_string()
            },
            stats: BackendStats::default(),
        })
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Build one `<PRI>TAG: MSG\n` frame. Any trailing newline on `msg` is
/// stripped first so the frame carries exactly one terminator.
pub(crate) fn frame(priority: u8, tag: &str, msg: &[u8]) -> Vec<u8> {
    let msg = match msg.last() {
        Some(b'\n') => &msg[..msg.len() - 1],
        _ => msg,
    };
    let mut out = Vec::with_capacity(msg.len() + tag.len() + 8);
    out.extend_from_slice(format!("<{}>{}: ", priority, tag).as_bytes());
    out.extend_from_slice(msg);
    out.push(b'\n');
    out
}

impl Backend for SyslogBackend {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(transport) = self.transport.as_mut() else {
            self.stats.record_error();
            return Err(closed_error());
        };
        let frame = frame(self.priority, &self.tag, buf);
        match transport.send(&frame) {
            Ok(()) => {
                self.stats.record_write(frame.len() as u64);
                Ok(frame.len())
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.flush(),
            None => Ok(()),
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.flush()?;
        }
        Ok(())
    }

    fn supports_atomic(&self) -> bool {
        // Datagrams are atomic; stream transports are not.
        matches!(self.transport, Some(Transport::Udp(_, _)))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Syslog
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}
