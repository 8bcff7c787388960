//! Mutating operations as data.
//!
//! Every call into the engine is first expressed as a [`Command`] so it can
//! be written to the journal as an intent before anything is applied.

use serde::{Deserialize, Serialize};

use isopep_core::{Amount, PartyId, Timestamp};

/// A mutating operation and its arguments. The caller and target agreement
/// travel alongside, in the journal intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateAgreement {
        quantity: u64,
        unit_price: Amount,
        deadline: Timestamp,
        document_ref: String,
    },
    AcceptAgreement,
    ConfirmPayment {
        amount: Amount,
    },
    StartAgreement,
    DispatchOrder,
    UpdateDeliveryStatus {
        ok: bool,
    },
    ResolveDispute {
        decision: String,
    },
    RateSupplier {
        supplier: PartyId,
        score: u32,
    },
    SubmitProof {
        #[serde(with = "isopep_core::hex::serde_hex")]
        blob: Vec<u8>,
    },
    /// Issue funding-source tokens.
    Mint {
        to: PartyId,
        amount: Amount,
    },
    /// Authorize `spender` to pull up to `amount` from the caller.
    Approve {
        spender: PartyId,
        amount: Amount,
    },
}

impl Command {
    /// External operation name, used in logs and transition records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAgreement { .. } => "createAgreement",
            Self::AcceptAgreement => "acceptAgreement",
            Self::ConfirmPayment { .. } => "confirmPayment",
            Self::StartAgreement => "startAgreement",
            Self::DispatchOrder => "dispatchOrder",
            Self::UpdateDeliveryStatus { .. } => "updateDeliveryStatus",
            Self::ResolveDispute { .. } => "resolveDispute",
            Self::RateSupplier { .. } => "rateSupplier",
            Self::SubmitProof { .. } => "submitZKProof",
            Self::Mint { .. } => "mint",
            Self::Approve { .. } => "approve",
        }
    }

    /// Whether the command operates on an existing agreement.
    pub fn targets_agreement(&self) -> bool {
        !matches!(
            self,
            Self::CreateAgreement { .. } | Self::Mint { .. } | Self::Approve { .. }
        )
    }
}
