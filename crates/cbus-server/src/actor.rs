//! Simulator Actor
//!
//! All frame handling happens in this actor. Connection tasks forward every
//! inbound frame here through one queue, so frames are applied to the
//! simulated modules strictly one at a time and no locks guard module state.
//!
//! # Architecture
//!
//! The actor owns the [`Dispatcher`] and a bounded log of received frames;
//! once full, the oldest entries are dropped. Replies
//! are encoded once and published on a broadcast channel that every
//! connection subscribes to.

use std::collections::VecDeque;

use cbus_protocol::{EncodeFrame, Frame, NodeNumber, ParseError};
use cbus_sim::Dispatcher;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Identifies one client connection in logs
pub type ConnectionId = u64;

/// Commands sent to the simulator actor
#[derive(Debug)]
pub enum SimCommand {
    /// A frame arrived from a client
    Inbound {
        /// Source connection
        connection: ConnectionId,
        /// Frame text as received, terminator included
        text: String,
        /// Decoded frame, or why it could not be decoded
        frame: Result<Frame, ParseError>,
    },

    /// Broadcast a frame on behalf of a simulated module
    Emit {
        /// The frame to send
        frame: Frame,
    },

    /// Put a module into setup mode
    EnterSetup {
        /// Target node
        node_number: NodeNumber,
        /// Whether the node exists
        response: oneshot::Sender<bool>,
    },

    /// Query the node in learn mode
    LearningNode {
        /// Channel to send back the node
        response: oneshot::Sender<Option<NodeNumber>>,
    },

    /// Snapshot the received frame log
    ReceivedFrames {
        /// Channel to send back the frames
        response: oneshot::Sender<Vec<String>>,
    },

    /// Empty the received frame log
    ClearReceivedFrames {
        /// Signalled once cleared
        response: oneshot::Sender<()>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Internal state for the simulator actor
struct SimActorState {
    dispatcher: Dispatcher,
    /// Most recent frames received from any client, in arrival order
    received: VecDeque<String>,
    received_capacity: usize,
    outbound: broadcast::Sender<String>,
}

impl SimActorState {
    fn record(&mut self, text: String) {
        if self.received_capacity == 0 {
            return;
        }
        if self.received.len() == self.received_capacity {
            self.received.pop_front();
        }
        self.received.push_back(text);
    }

    fn broadcast(&self, frame: &Frame) {
        let text = frame.encode();
        debug!("-> {}", text);
        // No subscribers is fine: nobody is connected yet
        let _ = self.outbound.send(text);
    }
}

/// Run the simulator actor until shutdown or until every sender is dropped
///
/// At most `received_capacity` received frames are kept for inspection.
pub async fn run_sim_actor(
    dispatcher: Dispatcher,
    mut cmd_rx: mpsc::Receiver<SimCommand>,
    outbound: broadcast::Sender<String>,
    received_capacity: usize,
) {
    let mut state = SimActorState {
        dispatcher,
        received: VecDeque::new(),
        received_capacity,
        outbound,
    };
    info!(
        "Simulator actor started with {} modules",
        state.dispatcher.state().registry().len()
    );

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SimCommand::Inbound {
                connection,
                text,
                frame,
            } => {
                debug!("[{}] <- {}", connection, text);
                state.record(text);
                match frame {
                    Ok(frame) => {
                        for reply in state.dispatcher.handle_frame(frame) {
                            state.broadcast(&reply);
                        }
                    }
                    Err(e) => debug!("[{}] ignoring undecodable frame: {}", connection, e),
                }
            }

            SimCommand::Emit { frame } => state.broadcast(&frame),

            SimCommand::EnterSetup {
                node_number,
                response,
            } => {
                let found = match state.dispatcher.enter_setup(node_number) {
                    Some(rqnn) => {
                        state.broadcast(&rqnn);
                        true
                    }
                    None => {
                        warn!("enter_setup: no module with node number {}", node_number);
                        false
                    }
                };
                let _ = response.send(found);
            }

            SimCommand::LearningNode { response } => {
                let _ = response.send(state.dispatcher.state().learning_node());
            }

            SimCommand::ReceivedFrames { response } => {
                let _ = response.send(state.received.iter().cloned().collect());
            }

            SimCommand::ClearReceivedFrames { response } => {
                state.received.clear();
                let _ = response.send(());
            }

            SimCommand::Shutdown => break,
        }
    }

    info!("Simulator actor stopped");
}
