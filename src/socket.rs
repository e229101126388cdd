//! Binds a UDP socket, validates the wire prelude, and feeds the ingress
//! queue. An external collaborator (spec.md §1) included so the crate runs
//! end-to-end; none of its failure modes leak into the core pipeline.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::UdpReceiverConfig;
use crate::error::{CollectorError, Result};
use crate::ingress::IngressQueue;

const PRELUDE_SIZE: usize = 16;
/// Bounds how long a blocked `recv_from` can hold up a clean shutdown, the
/// same role `RtpSocket::bind`'s read timeout plays for its receive loop.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Runs the blocking receive loop on its own thread, validating the §6
/// prelude and feeding well-formed payloads to an `IngressQueue`.
pub struct UdpReceiver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl UdpReceiver {
    /// Binds the socket and spawns the receiver thread. The thread runs
    /// until `stop()` is called.
    pub fn start(config: UdpReceiverConfig, queue: IngressQueue) -> Result<Self> {
        let socket = bind(&config)?;
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let max_packet_size = config.max_packet_size;

        let handle = thread::spawn(move || {
            receive_loop(socket, queue, thread_running, max_packet_size);
        });

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Flips the running flag and joins the receiver thread. Packets already
    /// in the ingress queue are untouched.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(config: &UdpReceiverConfig) -> Result<UdpSocket> {
    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .map_err(|e| CollectorError::Fatal(format!("invalid bind address: {e}")))?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| CollectorError::Fatal(format!("socket create failed: {e}")))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| CollectorError::Fatal(format!("set_reuse_address failed: {e}")))?;
    socket
        .bind(&addr.into())
        .map_err(|e| CollectorError::Fatal(format!("bind failed: {e}")))?;
    socket
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(|e| CollectorError::Fatal(format!("set_read_timeout failed: {e}")))?;
    let _ = socket.set_recv_buffer_size(config.buffer_size);

    Ok(socket.into())
}

fn receive_loop(socket: UdpSocket, queue: IngressQueue, running: Arc<AtomicBool>, max_packet_size: usize) {
    let mut buf = vec![0u8; max_packet_size + PRELUDE_SIZE];

    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, _addr)) => match extract_payload(&buf[..len]) {
                Ok(payload) => {
                    if let Err(e) = queue.append(payload) {
                        log::error!("ingress queue append failed: {e}");
                    }
                }
                Err(e) => {
                    log::warn!("dropping malformed datagram: {e}");
                }
            },
            Err(e) if is_timeout(&e) => {
                log::debug!("recv_from timed out, still running: {e}");
            }
            Err(e) => {
                log::warn!("recv_from error: {e}");
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Validates the 16-byte prelude (spec.md §6): bytes 0-1 are the payload
/// length in network byte order; bytes 2-15 are opaque. Returns the payload
/// bytes on success.
fn extract_payload(datagram: &[u8]) -> Result<Vec<u8>> {
    if datagram.len() < PRELUDE_SIZE {
        return Err(CollectorError::InvalidArgument(format!(
            "datagram shorter than the {PRELUDE_SIZE}-byte prelude (got {})",
            datagram.len()
        )));
    }
    let declared_len = u16::from_be_bytes([datagram[0], datagram[1]]) as usize;
    let actual_len = datagram.len() - PRELUDE_SIZE;
    if declared_len != actual_len {
        return Err(CollectorError::InvalidArgument(format!(
            "declared payload length {declared_len} does not match actual {actual_len}"
        )));
    }
    Ok(datagram[PRELUDE_SIZE..].to_vec())
}
