use super::ground_messages;
use crate::warn;
use prost::Message;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};

/// Upstream frames longer than this are treated as a protocol violation.
const MAX_UPSTREAM_FRAME: u32 = 64 * 1024;
const DOWNSTREAM_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundEvent {
    Connected(SocketAddr),
    Disconnected,
    Command(String),
}

/// TCP listener the ground station connects to.
///
/// Upstream frames are a `u32` length followed by UTF-8 command text, downstream frames a
/// `u32` length followed by an encoded [`ground_messages::Downstream`].
pub(crate) struct GroundEndpoint {
    downstream_sender: broadcast::Sender<Option<Vec<u8>>>,
    upstream_event_receiver: mpsc::UnboundedReceiver<GroundEvent>,
    local_addr: SocketAddr,
    close_oneshot_sender: Option<oneshot::Sender<()>>,
}

impl GroundEndpoint {
    async fn handle_connection_rx(
        socket: &mut ReadHalf<'_>,
        upstream_event_sender: &mpsc::UnboundedSender<GroundEvent>,
    ) -> Result<(), std::io::Error> {
        loop {
            let length = socket.read_u32().await?;
            if length > MAX_UPSTREAM_FRAME {
                return Err(std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("upstream frame of {length} bytes"),
                ));
            }
            let mut buffer = vec![0u8; length as usize];
            socket.read_exact(&mut buffer).await?;

            match String::from_utf8(buffer) {
                Ok(text) => {
                    let _ = upstream_event_sender.send(GroundEvent::Command(text.trim().to_string()));
                }
                Err(e) => warn!("Dropping non UTF-8 ground command: {e}"),
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn handle_connection_tx(
        socket: &mut WriteHalf<'_>,
        downstream_receiver: &mut broadcast::Receiver<Option<Vec<u8>>>,
    ) -> Result<(), std::io::Error> {
        loop {
            match downstream_receiver.recv().await {
                Ok(Some(message_buffer)) => {
                    socket.write_u32(message_buffer.len() as u32).await?;
                    socket.write_all(&message_buffer).await?;
                }
                Ok(None) | Err(RecvError::Closed) => return Ok(()),
                Err(RecvError::Lagged(n)) => warn!("Ground link lagging, {n} frames dropped"),
            }
        }
    }

    /// Binds the listener and starts accepting ground stations.
    pub(crate) async fn start(addr: &str) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let downstream_sender = broadcast::Sender::new(DOWNSTREAM_CAPACITY);
        let (upstream_event_sender, upstream_event_receiver) = mpsc::unbounded_channel();
        let (close_oneshot_sender, mut close_oneshot_receiver) = oneshot::channel();
        let inst = Self {
            downstream_sender: downstream_sender.clone(),
            upstream_event_receiver,
            local_addr,
            close_oneshot_sender: Some(close_oneshot_sender),
        };

        tokio::spawn(async move {
            loop {
                let accept = tokio::select! {
                    accept = listener.accept() => accept,
                    _ = &mut close_oneshot_receiver => break
                };
                let Ok((mut socket, peer)) = accept else { break };

                let mut downstream_receiver = downstream_sender.subscribe();
                let upstream_event_sender_local = upstream_event_sender.clone();
                let _ = upstream_event_sender.send(GroundEvent::Connected(peer));

                tokio::spawn(async move {
                    let (mut rx_socket, mut tx_socket) = socket.split();

                    let result = tokio::select! {
                        res = GroundEndpoint::handle_connection_tx(&mut tx_socket, &mut downstream_receiver) => res,
                        res = GroundEndpoint::handle_connection_rx(&mut rx_socket, &upstream_event_sender_local) => res
                    };
                    drop(downstream_receiver);

                    let _ = upstream_event_sender_local.send(GroundEvent::Disconnected);
                    match result {
                        Err(e)
                            if e.kind() == ErrorKind::UnexpectedEof
                                || e.kind() == ErrorKind::ConnectionReset
                                || e.kind() == ErrorKind::ConnectionAborted =>
                        {
                            return;
                        }
                        Err(e) => warn!("Closing connection to ground station due to {e:?}"),
                        Ok(()) => {}
                    }
                    let _ = socket.shutdown().await;
                });
            }
        });
        Ok(inst)
    }

    /// Encodes and queues one downstream frame for every connected ground station.
    pub(crate) fn send_downstream(&self, msg: ground_messages::DownstreamContent) {
        let _ = self.downstream_sender.send(Some(
            ground_messages::Downstream { content: Some(msg) }.encode_to_vec(),
        ));
    }

    pub(crate) fn is_ground_connected(&self) -> bool { self.downstream_sender.receiver_count() > 0 }

    pub(crate) async fn next_event(&mut self) -> Option<GroundEvent> {
        self.upstream_event_receiver.recv().await
    }

    pub(crate) fn local_addr(&self) -> SocketAddr { self.local_addr }
}

impl Drop for GroundEndpoint {
    fn drop(&mut self) {
        if let Some(close) = self.close_oneshot_sender.take() {
            let _ = close.send(());
        }
        let _ = self.downstream_sender.send(None);
    }
}
