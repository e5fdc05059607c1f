//! Outbound sink for streamed matches

use crate::error::SendError;
use crate::types::Match;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Delivers one match of a streaming response to the caller
#[async_trait]
pub trait MatchSender: Send + Sync {
    async fn send(&self, proposal: Match) -> Result<(), SendError>;
}

#[async_trait]
impl MatchSender for mpsc::Sender<Match> {
    async fn send(&self, proposal: Match) -> Result<(), SendError> {
        mpsc::Sender::send(self, proposal)
            .await
            .map_err(|_| SendError::new("response stream closed"))
    }
}

#[async_trait]
impl MatchSender for mpsc::UnboundedSender<Match> {
    async fn send(&self, proposal: Match) -> Result<(), SendError> {
        mpsc::UnboundedSender::send(self, proposal)
            .map_err(|_| SendError::new("response stream closed"))
    }
}
