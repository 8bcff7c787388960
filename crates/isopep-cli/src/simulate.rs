//! # Simulate Subcommand
//!
//! Drives one agreement through its lifecycle against a fresh engine:
//! mint, create, accept, approve, pay, start, dispatch, publish the oracle
//! reading, report delivery, then either rate the supplier or resolve the
//! dispute. Finalization is synced to an in-process ERP through the
//! outbox relay.
//!
//! Parameters default to the reference run and can be read from YAML:
//!
//! ```yaml
//! quantity: 1000
//! unit_price: 10
//! supplier: S3
//! delivery_ok: false
//! decision: ReleaseFunds
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use isopep_agreement::{
    AgreementEngine, AgreementView, Deployment, FileJournal, Journal, MemoryJournal, MockOracle,
};
use isopep_connect::{MemoryErp, OutboxRelay, SyncStatus};
use isopep_core::{Amount, PartyId};

/// Arguments for the `isopep simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Read scenario parameters from a YAML file.
    #[arg(long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,

    /// Report the delivery as failed and take the dispute branch.
    #[arg(long)]
    pub fail_delivery: bool,

    /// Arbitrator decision for the dispute branch.
    #[arg(long, value_name = "DECISION")]
    pub decision: Option<String>,

    /// Persist the run to a journal file.
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,

    /// Print the final read model as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parameters of one simulated agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub buyer: String,
    pub oracle: String,
    pub arbitrator: String,
    pub supplier: String,
    /// Tokens minted to the buyer before the run.
    pub mint: u64,
    pub quantity: u64,
    pub unit_price: u64,
    /// Deadline, in seconds from now.
    pub deadline_secs: i64,
    pub document_ref: String,
    /// Amount paid into escrow; the full price when absent.
    pub payment: Option<u64>,
    pub oracle_value: i64,
    pub delivery_ok: bool,
    pub decision: String,
    pub rating: u32,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            buyer: "buyer".into(),
            oracle: "oracle".into(),
            arbitrator: "arbitrator".into(),
            supplier: "S3".into(),
            mint: 10_000,
            quantity: 1_000,
            unit_price: 10,
            deadline_secs: 24 * 60 * 60,
            document_ref: "QmHashIsopepTOPSIS2025".into(),
            payment: None,
            oracle_value: 900,
            delivery_ok: true,
            decision: "RefundBuyer".into(),
            rating: 5,
        }
    }
}

impl Scenario {
    /// Load a scenario from YAML. Missing keys take reference values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse scenario YAML: {}", path.display()))
    }

    fn party(value: &str, field: &str) -> Result<PartyId> {
        PartyId::new(value).with_context(|| format!("scenario field {field}"))
    }

    pub fn deployment(&self) -> Result<Deployment> {
        Ok(Deployment {
            buyer: Self::party(&self.buyer, "buyer")?,
            oracle: Self::party(&self.oracle, "oracle")?,
            arbitrator: Self::party(&self.arbitrator, "arbitrator")?,
        })
    }
}

/// What a simulation ended with.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub agreement: AgreementView,
    pub buyer_balance: Amount,
    pub supplier_balance: Amount,
    pub oracle_value: i128,
    pub erp_status: SyncStatus,
}

/// Execute the simulate subcommand.
pub fn run_simulate(args: &SimulateArgs) -> Result<u8> {
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::default(),
    };
    if args.fail_delivery {
        scenario.delivery_ok = false;
    }
    if let Some(decision) = &args.decision {
        scenario.decision = decision.clone();
    }

    let journal: Box<dyn Journal> = match &args.journal {
        Some(path) => Box::new(
            FileJournal::open(path)
                .with_context(|| format!("failed to open journal: {}", path.display()))?,
        ),
        None => Box::new(MemoryJournal::new()),
    };

    let outcome = simulate(&scenario, journal)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        let a = &outcome.agreement;
        println!("agreement      {}", a.id);
        println!("state          {} ({})", a.state, a.state_code);
        println!("escrow         {}", a.escrow_amount);
        println!("deposited      {}", a.total_deposited);
        println!("oracle         {}", outcome.oracle_value);
        println!("buyer balance  {}", outcome.buyer_balance);
        println!("{:<14} {}", format!("{} balance", scenario.supplier), outcome.supplier_balance);
        println!("erp sync       {}", outcome.erp_status);
    }
    Ok(0)
}

/// Run `scenario` against a fresh engine writing to `journal`.
pub fn simulate(scenario: &Scenario, journal: Box<dyn Journal>) -> Result<Outcome> {
    let deployment = scenario.deployment()?;
    let buyer = deployment.buyer.clone();
    let oracle_id = deployment.oracle.clone();
    let arbitrator = deployment.arbitrator.clone();
    let supplier = Scenario::party(&scenario.supplier, "supplier")?;

    let oracle = Arc::new(MockOracle::default());
    let engine = Arc::new(
        AgreementEngine::open(deployment, journal)
            .context("failed to replay journal")?
            .with_oracle(oracle.clone()),
    );

    engine
        .mint(&buyer, &buyer, Amount::from(scenario.mint))
        .context("mint")?;

    let deadline = engine
        .now()
        .plus_secs(scenario.deadline_secs)
        .context("deadline out of range")?;
    let id = engine
        .create_agreement(
            &buyer,
            scenario.quantity,
            Amount::from(scenario.unit_price),
            deadline,
            scenario.document_ref.clone(),
        )
        .context("createAgreement")?
        .agreement_id
        .context("createAgreement returned no agreement id")?;
    tracing::info!(agreement_id = %id, "agreement created");

    engine.accept_agreement(id, &supplier).context("acceptAgreement")?;

    let total = engine.agreement(id)?.total_price;
    let payment = scenario.payment.map(Amount::from).unwrap_or(total);
    engine
        .approve(&buyer, &PartyId::escrow_account(&id), payment)
        .context("approve")?;
    engine
        .confirm_payment(id, &buyer, payment)
        .context("confirmPayment")?;
    engine.start_agreement(id, &buyer).context("startAgreement")?;
    engine.dispatch_order(id, &supplier).context("dispatchOrder")?;

    oracle.set_latest_answer(i128::from(scenario.oracle_value));
    let oracle_value = engine.oracle_data().context("getOracleData")?;

    engine
        .update_delivery_status(id, &oracle_id, scenario.delivery_ok)
        .context("updateDeliveryStatus")?;

    if scenario.delivery_ok {
        engine
            .rate_supplier(id, &buyer, &supplier, scenario.rating)
            .context("rateSupplier")?;
    } else {
        engine
            .resolve_dispute(id, &arbitrator, scenario.decision.clone())
            .context("resolveDispute")?;
    }

    let erp = Arc::new(MemoryErp::new());
    let relay = OutboxRelay::new(engine.clone(), erp.clone());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;
    let report = runtime.block_on(relay.run_once());
    tracing::debug!(?report, "relay pass");

    Ok(Outcome {
        agreement: engine.agreement(id)?,
        buyer_balance: engine.balance_of(&buyer),
        supplier_balance: engine.balance_of(&supplier),
        oracle_value,
        erp_status: erp.status(&id.to_string()),
    })
}
