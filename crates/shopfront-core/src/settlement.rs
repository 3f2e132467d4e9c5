//! # Settlement State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Validating ──► Pricing ──► ReconcilingPayment ──► Committing ──► Committed
//! │      ▲                                                  │               │
//! │      └──────────── restart (commit-time conflict) ──────┘               │
//! │                                                                         │
//! │  Any non-terminal stage ──► Failed                                      │
//! │                                                                         │
//! │  Nothing is written before Committing, and Committing is one database   │
//! │  transaction, so Failed never leaves partial state behind.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// A stage of one settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStage {
    /// Loading snapshots and pre-checking stock.
    #[default]
    Validating,
    /// Resolving discounts and computing totals.
    Pricing,
    /// Matching payment instruments against the total.
    ReconcilingPayment,
    /// Inside the write transaction.
    Committing,
    Committed,
    Failed,
}

impl SettlementStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SettlementStage::Validating => "validating",
            SettlementStage::Pricing => "pricing",
            SettlementStage::ReconcilingPayment => "reconciling_payment",
            SettlementStage::Committing => "committing",
            SettlementStage::Committed => "committed",
            SettlementStage::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, SettlementStage::Committed | SettlementStage::Failed)
    }

    /// The stage that follows on success, if any.
    pub const fn next(&self) -> Option<SettlementStage> {
        match self {
            SettlementStage::Validating => Some(SettlementStage::Pricing),
            SettlementStage::Pricing => Some(SettlementStage::ReconcilingPayment),
            SettlementStage::ReconcilingPayment => Some(SettlementStage::Committing),
            SettlementStage::Committing => Some(SettlementStage::Committed),
            SettlementStage::Committed | SettlementStage::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: SettlementStage) -> bool {
        match (self, to) {
            (from, SettlementStage::Failed) => !from.is_terminal(),
            (SettlementStage::Committing, SettlementStage::Validating) => true,
            (from, to) => from.next() == Some(to),
        }
    }

    pub fn transition(self, to: SettlementStage) -> CoreResult<SettlementStage> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CoreError::InvalidStageTransition { from: self, to })
        }
    }

    /// Moves to the next stage on success.
    pub fn advance(self) -> CoreResult<SettlementStage> {
        match self.next() {
            Some(to) => Ok(to),
            None => Err(CoreError::InvalidStageTransition {
                from: self,
                to: self,
            }),
        }
    }

    /// Goes back to `Validating` after losing a commit-time race.
    pub fn restart(self) -> CoreResult<SettlementStage> {
        self.transition(SettlementStage::Validating)
    }

    pub fn fail(self) -> CoreResult<SettlementStage> {
        self.transition(SettlementStage::Failed)
    }
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
