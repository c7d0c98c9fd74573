//! Capability surface of the ledger environment.
//!
//! The harness never reaches for ambient chain state: every component receives the ledger
//! by reference and only talks to it through these traits. `crate::sim::SimChain` is the
//! in-process implementation used by the suite and the tests.

pub mod scope;

use crate::error::Result;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;

pub use scope::{ScopeHandle, StateScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Actor {
    pub address: Address,
}

impl Actor {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

/// Raw checkpoint identifier issued by the ledger backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRef {
    pub name: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractArg {
    Address(Address),
    Addresses(Vec<Address>),
    Uint(U256),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreHandles {
    pub controller: Address,
    pub reward_token: Address,
    pub fee_reward_forwarder: Address,
    pub bookkeeper: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultInfo {
    pub name: String,
    pub underlying: Address,
    pub assets: Vec<Address>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn actors(&self) -> Result<Vec<Actor>>;
    async fn snapshot(&self) -> Result<SnapshotId>;
    /// Restores the state captured by `id`. Consumes `id` and every checkpoint taken after it.
    async fn revert(&self, id: SnapshotId) -> Result<()>;
    async fn advance_time(&self, seconds: u64) -> Result<()>;
    async fn timestamp(&self) -> Result<u64>;
}

#[async_trait]
pub trait TokenOps: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;
    async fn approve(
        &self,
        owner: Actor,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()>;
    async fn decimals(&self, token: Address) -> Result<u8>;
    async fn symbol(&self, token: Address) -> Result<String>;
    async fn total_supply(&self, token: Address) -> Result<U256>;
}

#[async_trait]
pub trait SwapOps: Send + Sync {
    /// Sells `amount_in` of `token_in` for `token_out` on the pair behind `router`.
    /// The router must hold an allowance over `token_in`.
    async fn swap_exact_input(
        &self,
        actor: Actor,
        router: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256>;
    /// Wraps `value` of native currency and sells it for `token_out`.
    async fn swap_exact_native_input(
        &self,
        actor: Actor,
        router: Address,
        token_out: Address,
        value: U256,
    ) -> Result<U256>;
    async fn has_pair(&self, router: Address, token_a: Address, token_b: Address) -> Result<bool>;
    /// Swap contract that minted `lp_token`.
    async fn pool_of_lp(&self, lp_token: Address) -> Result<Address>;
    async fn pool_tokens(&self, pool: Address) -> Result<Vec<Address>>;
    async fn add_liquidity(
        &self,
        actor: Actor,
        pool: Address,
        amounts: &[U256],
        min_to_mint: U256,
        deadline: u64,
    ) -> Result<U256>;
}

#[async_trait]
pub trait PriceDiscovery: Send + Sync {
    /// Deepest pool for `token` as `(counterpart, factory index)`.
    async fn largest_pool(
        &self,
        calculator: Address,
        token: Address,
        excluded_factories: &[Address],
    ) -> Result<Option<(Address, usize)>>;
    async fn swap_factory(&self, calculator: Address, index: usize) -> Result<Address>;
    /// Price of one whole `token` in the default output token, scaled by 1e18.
    async fn price_with_default_output(&self, calculator: Address, token: Address)
        -> Result<U256>;
}

#[async_trait]
pub trait StrategyOps: Send + Sync {
    async fn harvest(&self, admin: Actor, strategy: Address) -> Result<()>;
    async fn emergency_exit(&self, admin: Actor, strategy: Address) -> Result<()>;
    async fn ready_to_claim(&self, strategy: Address) -> Result<U256>;
    /// Underlying held by the strategy plus its position on the reward venue.
    async fn invested_underlying_balance(&self, strategy: Address) -> Result<U256>;
    /// Position staked on the reward venue only.
    async fn reward_pool_balance(&self, strategy: Address) -> Result<U256>;
    async fn strategy_underlying(&self, strategy: Address) -> Result<Address>;
}

#[async_trait]
pub trait VaultOps: Send + Sync {
    async fn deposit(&self, actor: Actor, vault: Address, amount: U256) -> Result<()>;
    async fn withdraw(&self, actor: Actor, vault: Address, shares: U256) -> Result<()>;
    async fn underlying_balance_in_vault(&self, vault: Address) -> Result<U256>;
    /// Total value the vault controls: idle funds plus everything its strategy holds.
    async fn underlying_balance_with_investment(&self, vault: Address) -> Result<U256>;
}

#[async_trait]
pub trait ProtocolDeployer: Send + Sync {
    async fn deploy_core(
        &self,
        admin: Actor,
        reward_delay_secs: u64,
        profit_share_permille: u32,
    ) -> Result<CoreHandles>;
    async fn deploy_price_discovery(&self, admin: Actor, controller: Address)
        -> Result<Vec<Address>>;
    async fn deploy_contract(
        &self,
        admin: Actor,
        name: &str,
        args: &[ContractArg],
    ) -> Result<ContractRef>;
    async fn connect(&self, actor: Actor, interface: &str, address: Address)
        -> Result<ContractRef>;
    async fn set_conversion_path(
        &self,
        admin: Actor,
        forwarder: Address,
        hops: &[Address],
        routers: &[Address],
    ) -> Result<()>;
    async fn conversion_path(
        &self,
        forwarder: Address,
        from: Address,
        to: Address,
    ) -> Result<Option<(Vec<Address>, Vec<Address>)>>;
    async fn add_vault_and_strategy(
        &self,
        admin: Actor,
        controller: Address,
        vault: Address,
        strategy: Address,
    ) -> Result<()>;
}

#[async_trait]
pub trait VaultRegistry: Send + Sync {
    async fn vaults(&self, bookkeeper: Address) -> Result<Vec<Address>>;
    async fn vault_info(&self, vault: Address) -> Result<VaultInfo>;
}

/// Everything the harness needs from one ledger environment.
pub trait Chain:
    Ledger
    + TokenOps
    + SwapOps
    + PriceDiscovery
    + StrategyOps
    + VaultOps
    + ProtocolDeployer
    + VaultRegistry
{
}

impl<T> Chain for T where
    T: Ledger
        + TokenOps
        + SwapOps
        + PriceDiscovery
        + StrategyOps
        + VaultOps
        + ProtocolDeployer
        + VaultRegistry
        + ?Sized
{
}
