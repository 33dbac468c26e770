use super::envelope::Message;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel peer hung up")]
    Closed,
}

/// Cloneable write half, handed to control loops that emit events on their own.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: UnboundedSender<Message>,
}

impl ChannelSender {
    pub fn send(&self, msg: impl Into<Message>) -> Result<(), ChannelError> {
        self.tx.send(msg.into()).map_err(|_| ChannelError::Closed)
    }

    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// One end of a duplex, ordered subsystem channel.
///
/// Messages are delivered strictly in send order. A message observed by [`ChannelEnd::poll`]
/// is kept back and handed out by the next receive, so polling never consumes anything.
#[derive(Debug)]
pub struct ChannelEnd {
    tx: ChannelSender,
    rx: UnboundedReceiver<Message>,
    pending: Option<Message>,
}

/// Creates a connected pair of channel ends, parent side first.
pub fn duplex() -> (ChannelEnd, ChannelEnd) {
    let (down_tx, down_rx) = mpsc::unbounded_channel();
    let (up_tx, up_rx) = mpsc::unbounded_channel();
    let parent = ChannelEnd { tx: ChannelSender { tx: down_tx }, rx: up_rx, pending: None };
    let child = ChannelEnd { tx: ChannelSender { tx: up_tx }, rx: down_rx, pending: None };
    (parent, child)
}

impl ChannelEnd {
    pub fn send(&self, msg: impl Into<Message>) -> Result<(), ChannelError> { self.tx.send(msg) }

    pub fn sender(&self) -> ChannelSender { self.tx.clone() }

    /// Waits for the next message. Cancel safe.
    pub async fn recv(&mut self) -> Result<Message, ChannelError> {
        if let Some(msg) = self.pending.take() {
            return Ok(msg);
        }
        self.rx.recv().await.ok_or(ChannelError::Closed)
    }

    /// Waits at most `timeout`; `Ok(None)` means nothing arrived in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>, ChannelError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn try_recv(&mut self) -> Result<Option<Message>, ChannelError> {
        if let Some(msg) = self.pending.take() {
            return Ok(Some(msg));
        }
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    /// Non-blocking check whether a message is waiting.
    pub fn poll(&mut self) -> Result<bool, ChannelError> {
        if self.pending.is_some() {
            return Ok(true);
        }
        match self.rx.try_recv() {
            Ok(msg) => {
                self.pending = Some(msg);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }
}
