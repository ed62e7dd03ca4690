//! Shared fixtures for node tests

use rainpool_common::ports::{ManualClock, QueuedOracleTransport, Role, TokenRail};
use rainpool_common::{AccountId, Amount, SECONDS_PER_DAY, WILDCARD_PLACE};
use rainpool_product::{RainProduct, RiskSpec};
use rainpool_riskpool::BundleSpec;
use std::sync::Arc;

use crate::config::NodeConfig;
use crate::wiring::InMemoryNode;

pub const NOW: i64 = 1_700_000_000;

pub fn insurer() -> AccountId {
    AccountId::from("insurer")
}

pub fn investor() -> AccountId {
    AccountId::from("investor")
}

pub fn customer() -> AccountId {
    AccountId::from("customer")
}

pub struct NodeFixture {
    pub product: RainProduct,
    pub transport: Arc<QueuedOracleTransport>,
    pub bundle_spec: BundleSpec,
    pub risk_spec: RiskSpec,
}

pub fn node_fixture() -> NodeFixture {
    let config = NodeConfig::default();
    let node = InMemoryNode::new(&config, Arc::new(ManualClock::at_timestamp(NOW)));

    node.access.grant(Role::Insurer, &insurer());
    node.access.grant(Role::Investor, &investor());

    let wallets = &config.riskpool.wallets;
    node.token
        .approve(&wallets.riskpool_wallet, &wallets.treasury, Amount::MAX);
    node.token.mint(&investor(), 1_000_000);
    node.token.approve(&investor(), &wallets.treasury, Amount::MAX);
    node.token.mint(&customer(), 10_000);
    node.token.approve(&customer(), &wallets.treasury, Amount::MAX);

    NodeFixture {
        product: node.product,
        transport: node.transport,
        bundle_spec: BundleSpec {
            name: "fixture".to_string(),
            lifetime: 90 * SECONDS_PER_DAY,
            min_protected_balance: 100,
            max_protected_balance: 10_000,
            min_duration: SECONDS_PER_DAY,
            max_duration: 15 * SECONDS_PER_DAY,
            place: WILDCARD_PLACE.to_string(),
        },
        risk_spec: RiskSpec {
            place: "10001.saopaulo".to_string(),
            start: NOW + 10,
            end: NOW + 10 + 2 * SECONDS_PER_DAY,
            lat: -23_550_000,
            long: -46_633_000,
            trigger: 100_000,
            exit: 1_000_000,
            prec_hist: 500,
            prec_days: 2,
            index: Default::default(),
        },
    }
}
