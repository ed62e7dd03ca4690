//! Engine actor
//!
//! The product runs on a single task that owns it outright. Callers talk to
//! it through an [`EngineHandle`], which sends a [`Command`] over an mpsc
//! channel and awaits the reply on a oneshot. Commands are applied one at a
//! time in arrival order.

use rainpool_common::{
    AccountId, Amount, BundleId, Event, EventRecord, ProcessId, RainpoolError, RequestId,
    Result, RiskId,
};
use rainpool_product::{
    ApplicationReceipt, ApplicationRequest, PremiumReceipt, RainProduct, RequestState, RiskSpec,
    Settlement, UnderwritingOutcome,
};
use rainpool_riskpool::{BundleSpec, PoolTotals};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Request to the engine task
#[derive(Debug)]
pub enum Command {
    CreateBundle {
        owner: AccountId,
        spec: BundleSpec,
        funding: Amount,
        reply: Reply<BundleId>,
    },
    CreateRisk {
        caller: AccountId,
        spec: RiskSpec,
        reply: Reply<RiskId>,
    },
    Apply {
        request: ApplicationRequest,
        reply: Reply<ApplicationReceipt>,
    },
    Underwrite {
        caller: AccountId,
        process_id: ProcessId,
        reply: Reply<UnderwritingOutcome>,
    },
    CollectPremium {
        caller: AccountId,
        process_id: ProcessId,
        payer: AccountId,
        amount: Amount,
        reply: Reply<PremiumReceipt>,
    },
    TriggerOracle {
        caller: AccountId,
        process_id: ProcessId,
        reply: Reply<RequestId>,
    },
    CancelOracle {
        caller: AccountId,
        process_id: ProcessId,
        reply: Reply<RequestId>,
    },
    Fulfill {
        request_id: RequestId,
        prec_actual: u64,
        days: Option<u32>,
        reply: oneshot::Sender<bool>,
    },
    /// Whether a request still awaits its response
    RequestPending {
        request_id: RequestId,
        reply: oneshot::Sender<bool>,
    },
    ProcessPolicy {
        caller: AccountId,
        process_id: ProcessId,
        reply: Reply<Settlement>,
    },
    ProcessRisk {
        caller: AccountId,
        risk_id: RiskId,
        batch_size: usize,
        reply: Reply<Vec<ProcessId>>,
    },
    PoolTotals {
        reply: oneshot::Sender<PoolTotals>,
    },
    EventsSince {
        from: u64,
        reply: oneshot::Sender<Vec<EventRecord>>,
    },
}

/// Cloneable handle to the engine task
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

/// Spawn the engine task
pub fn spawn(product: RainProduct, buffer: usize) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(buffer);
    let task = tokio::spawn(run(product, rx));
    (EngineHandle { tx }, task)
}

async fn run(mut product: RainProduct, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        apply(&mut product, command);
    }
    info!("Command channel closed, engine exiting");
}

fn apply(product: &mut RainProduct, command: Command) {
    // A dropped reply receiver means the caller gave up; the command still ran.
    match command {
        Command::CreateBundle {
            owner,
            spec,
            funding,
            reply,
        } => {
            let _ = reply.send(product.riskpool_mut().create_bundle(&owner, spec, funding));
        }
        Command::CreateRisk {
            caller,
            spec,
            reply,
        } => {
            let _ = reply.send(product.create_risk(&caller, spec));
        }
        Command::Apply { request, reply } => {
            let _ = reply.send(product.apply_for_policy(request));
        }
        Command::Underwrite {
            caller,
            process_id,
            reply,
        } => {
            let _ = reply.send(product.underwrite(&caller, process_id));
        }
        Command::CollectPremium {
            caller,
            process_id,
            payer,
            amount,
            reply,
        } => {
            let _ = reply.send(product.collect_premium_from(&caller, process_id, &payer, amount));
        }
        Command::TriggerOracle {
            caller,
            process_id,
            reply,
        } => {
            let _ = reply.send(product.trigger_oracle(&caller, process_id));
        }
        Command::CancelOracle {
            caller,
            process_id,
            reply,
        } => {
            let _ = reply.send(product.cancel_oracle_request(&caller, process_id));
        }
        Command::Fulfill {
            request_id,
            prec_actual,
            days,
            reply,
        } => {
            let _ = reply.send(product.fulfill(request_id, prec_actual, days));
        }
        Command::RequestPending { request_id, reply } => {
            let pending = product
                .oracle_request(request_id)
                .is_some_and(|r| r.state == RequestState::Triggered);
            let _ = reply.send(pending);
        }
        Command::ProcessPolicy {
            caller,
            process_id,
            reply,
        } => {
            let _ = reply.send(product.process_policy(&caller, process_id));
        }
        Command::ProcessRisk {
            caller,
            risk_id,
            batch_size,
            reply,
        } => {
            let _ = reply.send(product.process_policies_for_risk(&caller, risk_id, batch_size));
        }
        Command::PoolTotals { reply } => {
            let _ = reply.send(product.riskpool().totals());
        }
        Command::EventsSince { from, reply } => {
            let _ = reply.send(product.events().since(from));
        }
    }
}

fn engine_stopped() -> RainpoolError {
    RainpoolError::Internal("engine stopped".into())
}

impl EngineHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| engine_stopped())?;
        rx.await.map_err(|_| engine_stopped())?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| engine_stopped())?;
        rx.await.map_err(|_| engine_stopped())
    }

    pub async fn create_bundle(
        &self,
        owner: AccountId,
        spec: BundleSpec,
        funding: Amount,
    ) -> Result<BundleId> {
        self.call(|reply| Command::CreateBundle {
            owner,
            spec,
            funding,
            reply,
        })
        .await
    }

    pub async fn create_risk(&self, caller: AccountId, spec: RiskSpec) -> Result<RiskId> {
        self.call(|reply| Command::CreateRisk {
            caller,
            spec,
            reply,
        })
        .await
    }

    pub async fn apply_for_policy(&self, request: ApplicationRequest) -> Result<ApplicationReceipt> {
        self.call(|reply| Command::Apply { request, reply }).await
    }

    pub async fn underwrite(
        &self,
        caller: AccountId,
        process_id: ProcessId,
    ) -> Result<UnderwritingOutcome> {
        self.call(|reply| Command::Underwrite {
            caller,
            process_id,
            reply,
        })
        .await
    }

    pub async fn collect_premium_from(
        &self,
        caller: AccountId,
        process_id: ProcessId,
        payer: AccountId,
        amount: Amount,
    ) -> Result<PremiumReceipt> {
        self.call(|reply| Command::CollectPremium {
            caller,
            process_id,
            payer,
            amount,
            reply,
        })
        .await
    }

    pub async fn trigger_oracle(&self, caller: AccountId, process_id: ProcessId) -> Result<RequestId> {
        self.call(|reply| Command::TriggerOracle {
            caller,
            process_id,
            reply,
        })
        .await
    }

    pub async fn cancel_oracle_request(
        &self,
        caller: AccountId,
        process_id: ProcessId,
    ) -> Result<RequestId> {
        self.call(|reply| Command::CancelOracle {
            caller,
            process_id,
            reply,
        })
        .await
    }

    pub async fn fulfill(
        &self,
        request_id: RequestId,
        prec_actual: u64,
        days: Option<u32>,
    ) -> Result<bool> {
        debug!(%request_id, prec_actual, "forwarding oracle response");
        self.query(|reply| Command::Fulfill {
            request_id,
            prec_actual,
            days,
            reply,
        })
        .await
    }

    pub async fn is_request_pending(&self, request_id: RequestId) -> Result<bool> {
        self.query(|reply| Command::RequestPending { request_id, reply })
            .await
    }

    pub async fn process_policy(&self, caller: AccountId, process_id: ProcessId) -> Result<Settlement> {
        self.call(|reply| Command::ProcessPolicy {
            caller,
            process_id,
            reply,
        })
        .await
    }

    pub async fn process_policies_for_risk(
        &self,
        caller: AccountId,
        risk_id: RiskId,
        batch_size: usize,
    ) -> Result<Vec<ProcessId>> {
        self.call(|reply| Command::ProcessRisk {
            caller,
            risk_id,
            batch_size,
            reply,
        })
        .await
    }

    pub async fn pool_totals(&self) -> Result<PoolTotals> {
        self.query(|reply| Command::PoolTotals { reply }).await
    }

    pub async fn events_since(&self, from: u64) -> Result<Vec<EventRecord>> {
        self.query(|reply| Command::EventsSince { from, reply }).await
    }

    /// Events only, without record metadata
    pub async fn events(&self) -> Result<Vec<Event>> {
        Ok(self
            .events_since(0)
            .await?
            .into_iter()
            .map(|record| record.event)
            .collect())
    }
}
