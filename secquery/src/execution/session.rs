use crate::additive::AdditiveProtocol;
use crate::computation::SessionId;
use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::networking::AsyncNetworkingImpl;
use crate::types::Role;

/// Session object of one party.
///
/// Shared read-only by every operator invoked within a run; the protocol
/// handle keeps the counters that keep both parties in lockstep.
pub struct Session {
    session_id: SessionId,
    role: Role,
    config: ProtocolConfig,
    protocol: AdditiveProtocol,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        role: Role,
        config: ProtocolConfig,
        networking: AsyncNetworkingImpl,
    ) -> Result<Self> {
        let protocol = AdditiveProtocol::new(session_id.clone(), &config, &role, networking)?;
        Ok(Session {
            session_id,
            role,
            config,
            protocol,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Handle to the secure backend.
    pub fn protocol(&self) -> &AdditiveProtocol {
        &self.protocol
    }
}
