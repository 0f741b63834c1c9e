//! Per-client connection task
//!
//! Reads GridConnect text from the socket, splits it into frames and hands
//! them to the simulator actor, while writing every broadcast frame back to
//! the client in order.

use std::net::SocketAddr;

use cbus_protocol::{GridConnectCodec, ProtocolCodec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::actor::{ConnectionId, SimCommand};

/// Read buffer size for client sockets
const READ_BUFFER_SIZE: usize = 1024;

/// One connected client
pub struct ClientConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    codec: GridConnectCodec,
    sim_tx: mpsc::Sender<SimCommand>,
    outbound: broadcast::Receiver<String>,
}

impl ClientConnection {
    /// Wrap an accepted socket; `outbound` must be subscribed before the
    /// connection is announced so no broadcast is missed
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        stream: TcpStream,
        sim_tx: mpsc::Sender<SimCommand>,
        outbound: broadcast::Receiver<String>,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            codec: GridConnectCodec::new(),
            sim_tx,
            outbound,
        }
    }

    /// Serve the client until it disconnects, the simulator stops or
    /// shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[{}] client connected from {}", self.id, self.peer);
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let (mut reader, mut writer) = self.stream.split();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("[{}] shutdown requested", self.id);
                    break;
                }

                result = reader.read(&mut buffer) => {
                    match result {
                        Ok(0) => {
                            debug!("[{}] closed by peer", self.id);
                            break;
                        }
                        Ok(n) => {
                            self.codec.push_bytes(&buffer[..n]);
                            let mut stopped = false;
                            while let Some((frame, bytes)) = self.codec.next_command_with_bytes() {
                                let text = String::from_utf8_lossy(&bytes).into_owned();
                                let cmd = SimCommand::Inbound { connection: self.id, text, frame };
                                if self.sim_tx.send(cmd).await.is_err() {
                                    stopped = true;
                                    break;
                                }
                            }
                            if stopped {
                                debug!("[{}] simulator stopped", self.id);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("[{}] read error: {}", self.id, e);
                            break;
                        }
                    }
                }

                msg = self.outbound.recv() => {
                    match msg {
                        Ok(text) => {
                            if let Err(e) = writer.write_all(text.as_bytes()).await {
                                warn!("[{}] write error: {}", self.id, e);
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("[{}] client too slow, dropped {} frames", self.id, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        info!("[{}] client {} disconnected", self.id, self.peer);
    }
}
