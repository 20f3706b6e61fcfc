//! Publish gateway boundary.
//!
//! The gateway performs the actual post on a social network. It either
//! answers with the outcome directly or accepts the job and reports back
//! later through [`crate::Dispatcher::record_outcome`].

use async_trait::async_trait;

use crate::{
    content::{ChannelName, ContentId, PublishOutcome},
    Result,
};

/// How a publish call completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDispatch {
    /// The outcome is known now.
    Completed(PublishOutcome),
    /// The job was accepted; the outcome will arrive as a callback.
    Accepted,
}

/// Sends one content item to one channel.
#[async_trait]
pub trait PublishGateway: Send + Sync {
    /// An `Err` is a transport failure and is recorded as a failed channel.
    async fn publish(&self, content_id: &ContentId, channel: &ChannelName)
        -> Result<PublishDispatch>;
}
