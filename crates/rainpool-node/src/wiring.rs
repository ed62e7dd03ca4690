//! In-memory collaborator wiring
//!
//! Builds a product against in-memory ports and keeps typed handles to the
//! ports the node drives directly: the token (to mint and approve) and the
//! oracle queue (drained by the relay).

use rainpool_common::ports::{
    Clock, InMemoryAccessControl, InMemoryBundleToken, InMemoryToken, QueuedOracleTransport,
};
use rainpool_common::{EventLog, Ports};
use rainpool_product::RainProduct;
use std::sync::Arc;

use crate::config::NodeConfig;

pub struct InMemoryNode {
    pub product: RainProduct,
    pub token: Arc<InMemoryToken>,
    pub access: Arc<InMemoryAccessControl>,
    pub transport: Arc<QueuedOracleTransport>,
    pub events: EventLog,
}

impl InMemoryNode {
    pub fn new(config: &NodeConfig, clock: Arc<dyn Clock>) -> Self {
        let token = Arc::new(InMemoryToken::new());
        let access = Arc::new(InMemoryAccessControl::new());
        let transport = Arc::new(QueuedOracleTransport::new());
        let events = EventLog::new();

        let ports = Ports {
            token: token.clone(),
            access: access.clone(),
            bundle_token: Arc::new(InMemoryBundleToken::new()),
            oracle: transport.clone(),
            clock,
        };
        let product = RainProduct::new(
            config.product.clone(),
            config.riskpool.clone(),
            &ports,
            events.clone(),
        );

        Self {
            product,
            token,
            access,
            transport,
            events,
        }
    }
}
