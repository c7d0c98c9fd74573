//! In-process ledger environment.
//!
//! [`SimChain`] implements every capability trait in [`crate::ledger`] over a single [`World`].
//! Each call runs against a draft copy of the world that is committed only when the call
//! succeeds, so a reverted call leaves no partial effects. Snapshots are whole-world clones.

pub mod fixture;
pub mod protocol;
pub mod storage;
pub mod world;

pub use fixture::PolygonFixture;
pub use world::{units, StablePool, World};

use crate::error::{HarnessError, Result, ScopeError};
use crate::ledger::{
    Actor, ContractArg, ContractRef, CoreHandles, Ledger, PriceDiscovery, ProtocolDeployer,
    SnapshotId, StrategyOps, SwapOps, TokenOps, VaultInfo, VaultOps, VaultRegistry,
};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_MAX_SNAPSHOTS: usize = 64;

struct SimState {
    world: World,
    snapshots: Vec<(SnapshotId, World)>,
    next_snapshot: u64,
    max_snapshots: usize,
}

#[derive(Clone)]
pub struct SimChain {
    state: Arc<Mutex<SimState>>,
}

impl SimChain {
    pub fn new(world: World) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                world,
                snapshots: Vec::new(),
                next_snapshot: 0,
                max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            })),
        }
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&World) -> Result<T> + Send,
    {
        let state = self.state.lock().await;
        f(&state.world)
    }

    async fn transact<T, F>(&self, call: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut World) -> Result<T> + Send,
    {
        let mut state = self.state.lock().await;
        let mut draft = state.world.clone();
        match f(&mut draft) {
            Ok(out) => {
                state.world = draft;
                Ok(out)
            }
            Err(err) => {
                tracing::debug!("[SIM] {} failed: {}", call, err);
                Err(err)
            }
        }
    }

    /// Seconds a submitted transaction waits before inclusion. Deadlines of "now" fail when
    /// this is non-zero.
    pub async fn set_inclusion_delay(&self, seconds: u64) {
        self.state.lock().await.world.inclusion_delay = seconds;
    }

    pub async fn set_snapshot_limit(&self, limit: usize) {
        self.state.lock().await.max_snapshots = limit;
    }

    pub async fn live_snapshots(&self) -> usize {
        self.state.lock().await.snapshots.len()
    }

    pub async fn register_token(&self, address: Address, symbol: &str, decimals: u8) {
        self.state
            .lock()
            .await
            .world
            .register_token(address, symbol, decimals);
    }

    pub async fn deploy_token(&self, symbol: &str, decimals: u8) -> Address {
        self.state.lock().await.world.deploy_token(symbol, decimals)
    }

    pub async fn add_pair(
        &self,
        router: Address,
        token_a: Address,
        token_b: Address,
        reserve_a: U256,
        reserve_b: U256,
    ) -> Result<Address> {
        self.transact("createPair", |w| {
            w.add_pair(router, token_a, token_b, reserve_a, reserve_b)
        })
        .await
    }

    pub async fn add_stable_pool(
        &self,
        lp_symbol: &str,
        tokens: Vec<Address>,
    ) -> Result<StablePool> {
        self.transact("deployPool", |w| w.add_stable_pool(lp_symbol, tokens))
            .await
    }

    /// Test faucet.
    pub async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<()> {
        self.transact("mint", |w| {
            w.token(token)?;
            w.db.mint(token, to, amount)
        })
        .await
    }

    pub async fn native_balance(&self, owner: Address) -> U256 {
        self.state.lock().await.world.db.native_balance(owner)
    }
}

#[async_trait]
impl Ledger for SimChain {
    async fn actors(&self) -> Result<Vec<Actor>> {
        self.read(|w| Ok(w.actors.clone())).await
    }

    async fn snapshot(&self) -> Result<SnapshotId> {
        let mut state = self.state.lock().await;
        if state.snapshots.len() >= state.max_snapshots {
            return Err(ScopeError::SnapshotFailure(format!(
                "{} snapshots already live",
                state.max_snapshots
            ))
            .into());
        }
        state.next_snapshot += 1;
        let id = SnapshotId(state.next_snapshot);
        let world = state.world.clone();
        state.snapshots.push((id, world));
        Ok(id)
    }

    async fn revert(&self, id: SnapshotId) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(position) = state.snapshots.iter().position(|(sid, _)| *sid == id) else {
            return Err(ScopeError::InvalidHandle {
                seq: id.0,
                reason: "unknown ledger snapshot".to_string(),
            }
            .into());
        };
        let mut consumed = state.snapshots.split_off(position);
        let (_, world) = consumed.swap_remove(0);
        state.world = world;
        Ok(())
    }

    async fn advance_time(&self, seconds: u64) -> Result<()> {
        self.transact("evm_increaseTime", |w| w.advance_time(seconds))
            .await
    }

    async fn timestamp(&self) -> Result<u64> {
        self.read(|w| Ok(w.timestamp)).await
    }
}

#[async_trait]
impl TokenOps for SimChain {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        self.read(|w| Ok(w.db.balance(token, owner))).await
    }

    async fn approve(
        &self,
        owner: Actor,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        self.transact("approve", |w| {
            w.token(token)?;
            w.db.approve(token, owner.address, spender, amount)
        })
        .await
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        self.read(|w| Ok(w.token(token)?.decimals)).await
    }

    async fn symbol(&self, token: Address) -> Result<String> {
        self.read(|w| Ok(w.token(token)?.symbol.clone())).await
    }

    async fn total_supply(&self, token: Address) -> Result<U256> {
        self.read(|w| Ok(w.db.total_supply(token))).await
    }
}

#[async_trait]
impl SwapOps for SimChain {
    async fn swap_exact_input(
        &self,
        actor: Actor,
        router: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256> {
        self.transact("swapExactTokensForTokens", |w| {
            w.swap_exact_input(actor.address, router, token_in, token_out, amount_in)
        })
        .await
    }

    async fn swap_exact_native_input(
        &self,
        actor: Actor,
        router: Address,
        token_out: Address,
        value: U256,
    ) -> Result<U256> {
        self.transact("swapExactETHForTokens", |w| {
            w.swap_exact_native_input(actor.address, router, token_out, value)
        })
        .await
    }

    async fn has_pair(&self, router: Address, token_a: Address, token_b: Address) -> Result<bool> {
        self.read(|w| Ok(w.has_pair(router, token_a, token_b)))
            .await
    }

    async fn pool_of_lp(&self, lp_token: Address) -> Result<Address> {
        self.read(|w| w.pool_of_lp(lp_token)).await
    }

    async fn pool_tokens(&self, pool: Address) -> Result<Vec<Address>> {
        self.read(|w| Ok(w.stable_pool(pool)?.tokens.clone()))
            .await
    }

    async fn add_liquidity(
        &self,
        actor: Actor,
        pool: Address,
        amounts: &[U256],
        min_to_mint: U256,
        deadline: u64,
    ) -> Result<U256> {
        self.transact("addLiquidity", |w| {
            w.add_liquidity(actor.address, pool, amounts, min_to_mint, deadline)
        })
        .await
    }
}

#[async_trait]
impl PriceDiscovery for SimChain {
    async fn largest_pool(
        &self,
        calculator: Address,
        token: Address,
        excluded_factories: &[Address],
    ) -> Result<Option<(Address, usize)>> {
        self.read(|w| {
            w.ensure_calculator(calculator)?;
            Ok(w.largest_pool(token, excluded_factories))
        })
        .await
    }

    async fn swap_factory(&self, calculator: Address, index: usize) -> Result<Address> {
        self.read(|w| {
            w.ensure_calculator(calculator)?;
            w.swap_factory(index)
        })
        .await
    }

    async fn price_with_default_output(
        &self,
        calculator: Address,
        token: Address,
    ) -> Result<U256> {
        self.read(|w| {
            w.ensure_calculator(calculator)?;
            w.price_with_default_output(token)
        })
        .await
    }
}

#[async_trait]
impl StrategyOps for SimChain {
    async fn harvest(&self, admin: Actor, strategy: Address) -> Result<()> {
        self.transact("doHardWork", |w| w.harvest(admin.address, strategy))
            .await
    }

    async fn emergency_exit(&self, admin: Actor, strategy: Address) -> Result<()> {
        self.transact("emergencyExit", |w| {
            w.emergency_exit(admin.address, strategy)
        })
        .await
    }

    async fn ready_to_claim(&self, strategy: Address) -> Result<U256> {
        self.read(|w| w.ready_to_claim(strategy)).await
    }

    async fn invested_underlying_balance(&self, strategy: Address) -> Result<U256> {
        self.read(|w| w.invested_underlying_balance(strategy))
            .await
    }

    async fn reward_pool_balance(&self, strategy: Address) -> Result<U256> {
        self.read(|w| w.reward_pool_balance(strategy)).await
    }

    async fn strategy_underlying(&self, strategy: Address) -> Result<Address> {
        self.read(|w| Ok(w.protocol.strategy(strategy)?.underlying))
            .await
    }
}

#[async_trait]
impl VaultOps for SimChain {
    async fn deposit(&self, actor: Actor, vault: Address, amount: U256) -> Result<()> {
        self.transact("deposit", |w| w.deposit(actor.address, vault, amount))
            .await
    }

    async fn withdraw(&self, actor: Actor, vault: Address, shares: U256) -> Result<()> {
        self.transact("withdraw", |w| w.withdraw(actor.address, vault, shares))
            .await
    }

    async fn underlying_balance_in_vault(&self, vault: Address) -> Result<U256> {
        self.read(|w| w.underlying_balance_in_vault(vault)).await
    }

    async fn underlying_balance_with_investment(&self, vault: Address) -> Result<U256> {
        self.read(|w| w.underlying_balance_with_investment(vault))
            .await
    }
}

#[async_trait]
impl ProtocolDeployer for SimChain {
    async fn deploy_core(
        &self,
        admin: Actor,
        reward_delay_secs: u64,
        profit_share_permille: u32,
    ) -> Result<CoreHandles> {
        self.transact("deployCore", |w| {
            w.deploy_core(admin.address, reward_delay_secs, profit_share_permille)
        })
        .await
    }

    async fn deploy_price_discovery(
        &self,
        admin: Actor,
        controller: Address,
    ) -> Result<Vec<Address>> {
        self.transact("deployPriceCalculator", |w| {
            Ok(vec![w.deploy_price_calculator(admin.address, controller)?])
        })
        .await
    }

    async fn deploy_contract(
        &self,
        admin: Actor,
        name: &str,
        args: &[ContractArg],
    ) -> Result<ContractRef> {
        let address = self
            .transact(name, |w| w.deploy_contract(admin.address, name, args))
            .await?;
        Ok(ContractRef {
            name: name.to_string(),
            address,
        })
    }

    async fn connect(
        &self,
        _actor: Actor,
        interface: &str,
        address: Address,
    ) -> Result<ContractRef> {
        self.read(|w| {
            let known = match interface {
                "IERC20" | "IIronLpToken" => w.tokens.contains_key(&address),
                "IIronSwap" => w.stable_pools.contains_key(&address),
                "ISmartVault" => w.protocol.vaults.contains_key(&address),
                "IStrategy" => w.protocol.strategies.contains_key(&address),
                other => {
                    return Err(HarnessError::Deploy(format!(
                        "no ABI for interface `{other}`"
                    )))
                }
            };
            if !known {
                return Err(HarnessError::Deploy(format!(
                    "no {interface} deployed at {address:#x}"
                )));
            }
            Ok(ContractRef {
                name: interface.to_string(),
                address,
            })
        })
        .await
    }

    async fn set_conversion_path(
        &self,
        admin: Actor,
        forwarder: Address,
        hops: &[Address],
        routers: &[Address],
    ) -> Result<()> {
        self.transact("setConversionPath", |w| {
            w.set_conversion_path(admin.address, forwarder, hops, routers)
        })
        .await
    }

    async fn conversion_path(
        &self,
        forwarder: Address,
        from: Address,
        to: Address,
    ) -> Result<Option<(Vec<Address>, Vec<Address>)>> {
        self.read(|w| w.conversion_path(forwarder, from, to))
            .await
    }

    async fn add_vault_and_strategy(
        &self,
        admin: Actor,
        controller: Address,
        vault: Address,
        strategy: Address,
    ) -> Result<()> {
        self.transact("addVaultAndStrategy", |w| {
            w.add_vault_and_strategy(admin.address, controller, vault, strategy)
        })
        .await
    }
}

#[async_trait]
impl VaultRegistry for SimChain {
    async fn vaults(&self, bookkeeper: Address) -> Result<Vec<Address>> {
        self.read(|w| w.vaults(bookkeeper)).await
    }

    async fn vault_info(&self, vault: Address) -> Result<VaultInfo> {
        self.read(|w| w.vault_info(vault)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_chain() -> SimChain {
        let quote = Address::repeat_byte(0x02);
        let mut world = World::new(
            Address::repeat_byte(0x01),
            "WNATIVE",
            quote,
            Address::with_last_byte(0xa1),
        );
        world.register_token(quote, "QUOTE", 6);
        SimChain::new(world)
    }

    #[tokio::test]
    async fn test_revert_restores_time_and_drops_later_snapshots() {
        let chain = bare_chain();
        let start = chain.timestamp().await.unwrap();
        let first = chain.snapshot().await.unwrap();
        chain.advance_time(60).await.unwrap();
        let second = chain.snapshot().await.unwrap();
        chain.advance_time(60).await.unwrap();

        chain.revert(first).await.unwrap();
        assert_eq!(chain.timestamp().await.unwrap(), start);
        assert_eq!(chain.live_snapshots().await, 0);
        assert!(matches!(
            chain.revert(second).await,
            Err(HarnessError::Scope(ScopeError::InvalidHandle { .. }))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_limit_surfaces_as_snapshot_failure() {
        let chain = bare_chain();
        chain.set_snapshot_limit(1).await;
        chain.snapshot().await.unwrap();
        assert!(matches!(
            chain.snapshot().await,
            Err(HarnessError::Scope(ScopeError::SnapshotFailure(_)))
        ));
    }

    #[tokio::test]
    async fn test_failed_call_leaves_no_partial_effects() {
        let chain = bare_chain();
        let actor = chain.actors().await.unwrap()[0];
        let quote = Address::repeat_byte(0x02);
        chain
            .mint(quote, actor.address, U256::from(10u64))
            .await
            .unwrap();
        let wrapped = Address::repeat_byte(0x01);
        let err = chain
            .swap_exact_input(actor, Address::ZERO, quote, wrapped, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Reverted { .. }));
        assert_eq!(
            chain.balance_of(quote, actor.address).await.unwrap(),
            U256::from(10u64)
        );
    }
}
