//! Networking traits and implementations.

use crate::additive::RingTensor;
use crate::computation::{RendezvousKey, SessionId};
use crate::error::Result;
use crate::types::Role;
use async_trait::async_trait;
use std::sync::Arc;

pub mod local;

/// Requirements for asynchronous networking between the parties of a session.
///
/// Values are matched up by session id and rendezvous key; a receive blocks
/// until the matching send has happened.
#[async_trait]
pub trait AsyncNetworking: Send + Sync {
    async fn send(
        &self,
        value: &RingTensor,
        receiver: &Role,
        rendezvous_key: &RendezvousKey,
        session_id: &SessionId,
    ) -> Result<()>;

    async fn receive(
        &self,
        sender: &Role,
        rendezvous_key: &RendezvousKey,
        session_id: &SessionId,
    ) -> Result<RingTensor>;
}

pub type AsyncNetworkingImpl = Arc<dyn AsyncNetworking>;
