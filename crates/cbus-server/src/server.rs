//! TCP server and the handle used to drive it

use std::net::SocketAddr;

use cbus_protocol::{BootResponse, CbusMessage, EventName, Frame, NodeNumber};
use cbus_sim::{Dispatcher, ModuleRegistry, NetworkState};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::actor::{run_sim_actor, ConnectionId, SimCommand};
use crate::config::ServerConfig;
use crate::connection::ClientConnection;
use crate::error::{Result, ServerError};

/// Entry point for starting a simulated network
pub struct SimulatorServer;

impl SimulatorServer {
    /// Bind the listener and start serving `registry`'s modules
    pub async fn start(config: ServerConfig, registry: ModuleRegistry) -> Result<SimulatorHandle> {
        config.validate()?;
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let dispatcher = Dispatcher::new(NetworkState::new(registry));
        let (cmd_tx, cmd_rx) = mpsc::channel(config.inbound_capacity);
        let (outbound, _) = broadcast::channel(config.broadcast_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let actor_task = tokio::spawn(run_sim_actor(
            dispatcher,
            cmd_rx,
            outbound.clone(),
            config.received_log_capacity,
        ));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            cmd_tx.clone(),
            outbound.clone(),
            shutdown_rx,
        ));

        info!("CBUS simulator listening on {}", local_addr);

        Ok(SimulatorHandle {
            local_addr,
            cmd_tx,
            outbound,
            shutdown_tx,
            actor_task,
            accept_task,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<SimCommand>,
    outbound: broadcast::Sender<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_id: ConnectionId = 1;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("set_nodelay failed for {}: {}", peer, e);
                        }
                        let connection = ClientConnection::new(
                            next_id,
                            peer,
                            stream,
                            cmd_tx.clone(),
                            outbound.subscribe(),
                        );
                        next_id += 1;
                        tokio::spawn(connection.run(shutdown.clone()));
                    }
                    Err(e) => warn!("accept failed: {}", e),
                }
            }
        }
    }
}

/// Handle to a running simulator
///
/// Every call goes through the simulator actor, so emitted frames are
/// ordered with the replies to client frames.
pub struct SimulatorHandle {
    local_addr: SocketAddr,
    cmd_tx: mpsc::Sender<SimCommand>,
    outbound: broadcast::Sender<String>,
    shutdown_tx: watch::Sender<bool>,
    actor_task: JoinHandle<()>,
    accept_task: JoinHandle<()>,
}

impl SimulatorHandle {
    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.outbound.receiver_count()
    }

    /// Stop accepting, disconnect every client and stop the actor
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.cmd_tx.send(SimCommand::Shutdown).await;
        let _ = self.accept_task.await;
        let _ = self.actor_task.await;
        info!("CBUS simulator on {} stopped", self.local_addr);
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SimCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| ServerError::Stopped)?;
        rx.await.map_err(|_| ServerError::Stopped)
    }

    /// Frames received from clients, in arrival order
    ///
    /// Holds at most [`ServerConfig::received_log_capacity`] of the most
    /// recent frames.
    pub async fn received_frames(&self) -> Result<Vec<String>> {
        self.request(|response| SimCommand::ReceivedFrames { response })
            .await
    }

    pub async fn clear_received_frames(&self) -> Result<()> {
        self.request(|response| SimCommand::ClearReceivedFrames { response })
            .await
    }

    /// Put a module into setup mode, as if its button were pressed
    ///
    /// The module announces itself with RQNN. Returns `false` if no module
    /// has that node number.
    pub async fn enter_setup(&self, node_number: NodeNumber) -> Result<bool> {
        self.request(|response| SimCommand::EnterSetup {
            node_number,
            response,
        })
        .await
    }

    /// Node currently in learn mode
    pub async fn learning_node(&self) -> Result<Option<NodeNumber>> {
        self.request(|response| SimCommand::LearningNode { response })
            .await
    }

    /// Broadcast any frame
    pub async fn emit_frame(&self, frame: Frame) -> Result<()> {
        self.cmd_tx
            .send(SimCommand::Emit { frame })
            .await
            .map_err(|_| ServerError::Stopped)
    }

    /// Broadcast a message from the simulator's CAN id
    pub async fn emit(&self, message: CbusMessage) -> Result<()> {
        self.emit_frame(Frame::standard(message)).await
    }

    pub async fn emit_kloc(&self, session: u8) -> Result<()> {
        self.emit(CbusMessage::Kloc { session }).await
    }

    pub async fn emit_rqnn(&self, node_number: NodeNumber) -> Result<()> {
        self.emit(CbusMessage::Rqnn { node_number }).await
    }

    pub async fn emit_nnack(&self, node_number: NodeNumber) -> Result<()> {
        self.emit(CbusMessage::Nnack { node_number }).await
    }

    pub async fn emit_wrack(&self, node_number: NodeNumber) -> Result<()> {
        self.emit(CbusMessage::Wrack { node_number }).await
    }

    pub async fn emit_cmderr(&self, node_number: NodeNumber, error: u8) -> Result<()> {
        self.emit(CbusMessage::Cmderr { node_number, error }).await
    }

    pub async fn emit_nvans(&self, node_number: NodeNumber, nv_index: u8, nv_value: u8) -> Result<()> {
        self.emit(CbusMessage::Nvans {
            node_number,
            nv_index,
            nv_value,
        })
        .await
    }

    pub async fn emit_enrsp(&self, node_number: NodeNumber, event: EventName, event_index: u8) -> Result<()> {
        self.emit(CbusMessage::Enrsp {
            node_number,
            event,
            event_index,
        })
        .await
    }

    /// Long event on (ACON)
    pub async fn emit_accessory_on(&self, node_number: NodeNumber, event_number: u16) -> Result<()> {
        self.emit(CbusMessage::Acon {
            node_number,
            event_number,
        })
        .await
    }

    /// Long event off (ACOF)
    pub async fn emit_accessory_off(&self, node_number: NodeNumber, event_number: u16) -> Result<()> {
        self.emit(CbusMessage::Acof {
            node_number,
            event_number,
        })
        .await
    }

    /// Short event on (ASON)
    pub async fn emit_short_on(&self, node_number: NodeNumber, device_number: u16) -> Result<()> {
        self.emit(CbusMessage::Ason {
            node_number,
            device_number,
        })
        .await
    }

    /// Short event off (ASOF)
    pub async fn emit_short_off(&self, node_number: NodeNumber, device_number: u16) -> Result<()> {
        self.emit(CbusMessage::Asof {
            node_number,
            device_number,
        })
        .await
    }

    /// Bootloader response on the extended channel
    pub async fn emit_boot_response(&self, response: BootResponse) -> Result<()> {
        self.emit_frame(response.to_frame()).await
    }
}
