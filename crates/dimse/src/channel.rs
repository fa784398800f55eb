//! Message channel of an established association
//!
//! The dispatcher only sees decoded DIMSE messages and association
//! events. [`crate::ul::UlChannel`] provides them over TCP; the in-memory
//! [`MemoryChannel`] pairs a dispatcher with a local peer for tests and
//! in-process use.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::{DimseRequest, DimseResponse};
use crate::{DimseError, Result};

/// Something received on the association
#[derive(Debug)]
pub enum Received {
    Request(DimseRequest),
    /// Peer sent A-RELEASE-RQ
    ReleaseRequested,
    /// Peer sent A-ABORT
    Aborted,
    /// Transport closed without release or abort
    Closed,
}

/// Transport side of an association, as used by the dispatcher
#[async_trait]
pub trait DimseChannel: Send {
    /// Wait for the next message
    async fn receive(&mut self) -> Result<Received>;

    /// Send a response
    async fn send(&mut self, response: DimseResponse) -> Result<()>;

    /// Answer a release request
    async fn acknowledge_release(&mut self) -> Result<()>;

    /// Abort the association
    async fn abort(&mut self) -> Result<()>;
}

/// Messages from the local peer to the dispatcher
#[derive(Debug)]
enum PeerMessage {
    Request(DimseRequest),
    Release,
    Abort,
}

/// Events from the dispatcher back to the local peer
#[derive(Debug)]
pub enum PeerEvent {
    Response(DimseResponse),
    ReleaseAcknowledged,
    Aborted,
}

/// Dispatcher half of an in-memory association
pub struct MemoryChannel {
    incoming: mpsc::Receiver<PeerMessage>,
    outgoing: mpsc::Sender<PeerEvent>,
}

/// Requestor half of an in-memory association
pub struct MemoryPeer {
    outgoing: mpsc::Sender<PeerMessage>,
    incoming: mpsc::Receiver<PeerEvent>,
}

impl MemoryChannel {
    /// Create a connected channel / peer pair
    pub fn pair(buffer_size: usize) -> (MemoryChannel, MemoryPeer) {
        let (request_tx, request_rx) = mpsc::channel(buffer_size);
        let (event_tx, event_rx) = mpsc::channel(buffer_size);
        (
            MemoryChannel {
                incoming: request_rx,
                outgoing: event_tx,
            },
            MemoryPeer {
                outgoing: request_tx,
                incoming: event_rx,
            },
        )
    }
}

#[async_trait]
impl DimseChannel for MemoryChannel {
    async fn receive(&mut self) -> Result<Received> {
        Ok(match self.incoming.recv().await {
            Some(PeerMessage::Request(request)) => Received::Request(request),
            Some(PeerMessage::Release) => Received::ReleaseRequested,
            Some(PeerMessage::Abort) => Received::Aborted,
            None => Received::Closed,
        })
    }

    async fn send(&mut self, response: DimseResponse) -> Result<()> {
        self.outgoing
            .send(PeerEvent::Response(response))
            .await
            .map_err(|_| DimseError::ChannelClosed("peer dropped".into()))
    }

    async fn acknowledge_release(&mut self) -> Result<()> {
        self.outgoing
            .send(PeerEvent::ReleaseAcknowledged)
            .await
            .map_err(|_| DimseError::ChannelClosed("peer dropped".into()))
    }

    async fn abort(&mut self) -> Result<()> {
        // the peer may already be gone, which is fine for an abort
        let _ = self.outgoing.send(PeerEvent::Aborted).await;
        Ok(())
    }
}

impl MemoryPeer {
    /// Send a request without waiting for an answer
    pub async fn send(&self, request: DimseRequest) -> Result<()> {
        self.outgoing
            .send(PeerMessage::Request(request))
            .await
            .map_err(|_| DimseError::ChannelClosed("dispatcher stopped".into()))
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, request: DimseRequest) -> Result<DimseResponse> {
        self.send(request).await?;
        match self.next_event().await? {
            PeerEvent::Response(response) => Ok(response),
            other => Err(DimseError::UnexpectedPdu(format!("{:?}", other))),
        }
    }

    /// Wait for the next event from the dispatcher
    pub async fn next_event(&mut self) -> Result<PeerEvent> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| DimseError::ChannelClosed("dispatcher stopped".into()))
    }

    /// Request release and wait for the acknowledgement
    pub async fn release(&mut self) -> Result<()> {
        self.outgoing
            .send(PeerMessage::Release)
            .await
            .map_err(|_| DimseError::ChannelClosed("dispatcher stopped".into()))?;
        match self.next_event().await? {
            PeerEvent::ReleaseAcknowledged => Ok(()),
            other => Err(DimseError::UnexpectedPdu(format!("{:?}", other))),
        }
    }

    /// Abort the association
    pub async fn abort(&self) -> Result<()> {
        self.outgoing
            .send(PeerMessage::Abort)
            .await
            .map_err(|_| DimseError::ChannelClosed("dispatcher stopped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DimseCommand, DimseStatus, VERIFICATION_SOP_CLASS};

    #[tokio::test]
    async fn test_memory_channel_round_trip() {
        let (mut channel, mut peer) = MemoryChannel::pair(4);

        let server = tokio::spawn(async move {
            let request = match channel.receive().await.unwrap() {
                Received::Request(request) => request,
                other => panic!("Expected request, got {:?}", other),
            };
            channel
                .send(DimseResponse::for_request(&request, DimseStatus::Success))
                .await
                .unwrap();
            assert!(matches!(channel.receive().await.unwrap(), Received::ReleaseRequested));
            channel.acknowledge_release().await.unwrap();
        });

        let response = peer
            .request(DimseRequest::new(1, DimseCommand::Echo, 1, VERIFICATION_SOP_CLASS))
            .await
            .unwrap();
        assert_eq!(response.status, DimseStatus::Success);
        peer.release().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_peer_reads_as_closed() {
        let (mut channel, peer) = MemoryChannel::pair(1);
        drop(peer);
        assert!(matches!(channel.receive().await.unwrap(), Received::Closed));
    }
}
