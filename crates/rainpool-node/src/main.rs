//! Rainpool Node Binary
//!
//! Parametric rain insurance engine with an in-process oracle relay.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rainpool_common::ports::{Role, SystemClock, TokenRail};
use rainpool_common::{AccountId, Amount, Event, SECONDS_PER_DAY, VERSION, WILDCARD_PLACE};
use rainpool_node::{
    engine, EngineHandle, InMemoryNode, NodeConfig, Observation, OracleRelay,
    StaticObservationSource,
};
use rainpool_product::{ApplicationRequest, RiskSpec};
use rainpool_riskpool::BundleSpec;

const DEMO_PLACE: &str = "10001.saopaulo";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Rainpool Node v{}", VERSION);

    // Load configuration
    let config = NodeConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let node = InMemoryNode::new(&config, Arc::new(SystemClock));
    let transport = node.transport.clone();

    let source = match &config.observations_path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading observations from {}", path))?;
            StaticObservationSource::from_json(&json)?
        }
        None => StaticObservationSource::new(),
    };
    let source = if config.demo {
        source.with(
            DEMO_PLACE,
            Observation {
                prec_actual: 1_000,
                days: None,
            },
        )
    } else {
        source
    };

    if config.demo {
        seed_demo_accounts(&node, &config);
    }

    let (handle, engine_task) = engine::spawn(node.product, config.command_buffer);
    let relay = OracleRelay::new(
        transport,
        source,
        handle.clone(),
        Duration::from_millis(config.relay_interval_ms),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = tokio::spawn(relay.run(shutdown_rx));

    if config.demo {
        run_demo(&handle).await?;
    } else {
        info!("Rainpool node running, press Ctrl+C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("installing Ctrl+C handler")?;
        info!("Received shutdown signal");
    }

    let _ = shutdown_tx.send(true);
    relay_task.await?;
    drop(handle);
    engine_task.await?;

    info!("Rainpool node shutdown complete");
    Ok(())
}

fn insurer() -> AccountId {
    AccountId::from("insurer")
}

fn investor() -> AccountId {
    AccountId::from("investor")
}

fn customer() -> AccountId {
    AccountId::from("customer")
}

fn seed_demo_accounts(node: &InMemoryNode, config: &NodeConfig) {
    node.access.grant(Role::Insurer, &insurer());
    node.access.grant(Role::Investor, &investor());

    let wallets = &config.riskpool.wallets;
    node.token
        .approve(&wallets.riskpool_wallet, &wallets.treasury, Amount::MAX);
    for (account, funds) in [(investor(), 1_000_000), (customer(), 10_000)] {
        node.token.mint(&account, funds);
        node.token.approve(&account, &wallets.treasury, Amount::MAX);
    }
}

/// Scripted walk through one policy lifecycle
async fn run_demo(engine: &EngineHandle) -> Result<()> {
    let bundle_id = engine
        .create_bundle(
            investor(),
            BundleSpec {
                name: "demo".to_string(),
                lifetime: 90 * SECONDS_PER_DAY,
                min_protected_balance: 100,
                max_protected_balance: 10_000,
                min_duration: SECONDS_PER_DAY,
                max_duration: 15 * SECONDS_PER_DAY,
                place: WILDCARD_PLACE.to_string(),
            },
            100_000,
        )
        .await?;
    info!(%bundle_id, "demo bundle created");

    let start = chrono::Utc::now().timestamp() + 60;
    let risk_id = engine
        .create_risk(
            insurer(),
            RiskSpec {
                place: DEMO_PLACE.to_string(),
                start,
                end: start + 2 * SECONDS_PER_DAY,
                lat: -23_550_000,
                long: -46_633_000,
                trigger: 100_000,
                exit: 1_000_000,
                prec_hist: 500,
                prec_days: 2,
                index: Default::default(),
            },
        )
        .await?;

    let receipt = engine
        .apply_for_policy(ApplicationRequest {
            holder: customer(),
            wallet: None,
            premium: 100,
            sum_insured: 1_000,
            risk_id,
            bundle_id: None,
        })
        .await?;
    info!(process_id = %receipt.process_id, outcome = ?receipt.outcome, "demo application submitted");

    let request_id = engine.trigger_oracle(insurer(), receipt.process_id).await?;
    info!(%request_id, "waiting for oracle response");

    let mut answered = false;
    for _ in 0..50 {
        let events = engine.events().await?;
        if events
            .iter()
            .any(|e| matches!(e, Event::RiskDataReceived { request_id: id, .. } if *id == request_id))
        {
            answered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !answered {
        warn!(%request_id, "no oracle response, skipping claim processing");
        return Ok(());
    }

    let processed = engine
        .process_policies_for_risk(insurer(), risk_id, 0)
        .await?;
    info!(processed = processed.len(), "demo policies processed");

    for record in engine.events_since(0).await? {
        info!("{}", record.to_json());
    }
    let totals = engine.pool_totals().await?;
    info!(?totals, "final pool totals");
    Ok(())
}
