use alloy::primitives::{Address, U256};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("state scope error: {0}")]
    Scope(#[from] ScopeError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("conversion route rejected: {0}")]
    Route(#[from] RouteError),
    #[error("bootstrap failed at {stage} stage: {source}")]
    Bootstrap {
        stage: BootstrapStage,
        #[source]
        source: Box<HarnessError>,
    },
    #[error("deploy failed: {0}")]
    Deploy(String),
    #[error("call `{call}` reverted: {reason}")]
    Reverted { call: String, reason: String },
    #[error("insufficient {token:#x}: held {held}, needed {needed}")]
    InsufficientFunds {
        token: Address,
        held: U256,
        needed: U256,
    },
    #[error("liquidity add rejected: {0}")]
    LiquidityAddRejected(String),
    #[error("harvest failed on cycle {cycle}: {source}")]
    HarvestAborted {
        cycle: usize,
        #[source]
        source: Box<HarnessError>,
    },
    #[error(transparent)]
    Invariant(#[from] InvariantFailure),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn reverted(call: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reverted {
            call: call.into(),
            reason: reason.into(),
        }
    }

    pub fn at_stage(stage: BootstrapStage, source: HarnessError) -> Self {
        Self::Bootstrap {
            stage,
            source: Box::new(source),
        }
    }

    /// Stage that broke a bootstrap, if this error came out of one.
    pub fn bootstrap_stage(&self) -> Option<BootstrapStage> {
        match self {
            Self::Bootstrap { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error once bootstrap and harvest wrappers are peeled off.
    pub fn root(&self) -> &HarnessError {
        match self {
            Self::Bootstrap { source, .. } | Self::HarvestAborted { source, .. } => source.root(),
            other => other,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("ledger could not checkpoint state: {0}")]
    SnapshotFailure(String),
    #[error("snapshot handle #{seq} is no longer valid: {reason}")]
    InvalidHandle { seq: u64, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("no tradable pool found for {token:#x}")]
    NoLiquidityFound { token: Address },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route needs at least two hops, got {hops}")]
    TooShort { hops: usize },
    #[error("route has {hops} hops and {venues} venues; expected venues.len() == {expected}")]
    LengthMismatch {
        hops: usize,
        venues: usize,
        expected: usize,
    },
    #[error("hop {from:#x} -> {to:#x} is not tradable on venue {venue:#x}")]
    Untradable {
        from: Address,
        to: Address,
        venue: Address,
    },
    #[error("no router known for swap factory {factory:#x}")]
    MissingRouter { factory: Address },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStage {
    Fund,
    Resolve,
    Trade,
    AddLiquidity,
}

impl BootstrapStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fund => "fund",
            Self::Resolve => "resolve",
            Self::Trade => "trade",
            Self::AddLiquidity => "add-liquidity",
        }
    }
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A violated post-condition. This is the designed outcome of a failing check and is never
/// swallowed by the harness.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("[{check}] invariant `{invariant}` violated: observed {observed}, expected {expected}")]
pub struct InvariantFailure {
    pub check: &'static str,
    pub invariant: &'static str,
    pub observed: String,
    pub expected: String,
}

impl InvariantFailure {
    pub fn new(
        check: &'static str,
        invariant: &'static str,
        observed: impl fmt::Display,
        expected: impl fmt::Display,
    ) -> Self {
        Self {
            check,
            invariant,
            observed: observed.to_string(),
            expected: expected.to_string(),
        }
    }
}
