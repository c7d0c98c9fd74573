//! Single-sided liquidity bootstrap for the asset a strategy consumes.
//!
//! Stages run in order: fund, resolve, trade, add-liquidity. Basket funding is best effort and
//! reports shortfalls; every other stage is fatal and its error is tagged with the stage.

use crate::config::chains::ChainConfig;
use crate::error::{BootstrapStage, HarnessError, Result, RouteError};
use crate::ledger::{Actor, Ledger, PriceDiscovery, SwapOps, TokenOps};
use crate::oracle::{PoolChoice, PriceOracleAdapter};
use alloy::primitives::{Address, U256};
use serde::Serialize;

const NATIVE_UNIT: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub actor: Actor,
    /// LP token of the pool the position is opened in.
    pub lp_token: Address,
    /// The strategy's configured token set, in pool order.
    pub tokens: Vec<Address>,
    pub target_index: usize,
    /// Trade size in whole quote-currency units.
    pub base_amount: u64,
}

/// One basket token the actor could not buy. Logged, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasketFundingShortfall {
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub token: Address,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityPlan {
    pub pool: Address,
    pub target_index: usize,
    pub target_token: Address,
    pub counterpart: PoolChoice,
    pub trade_size_quote: u64,
    pub amount_for_sell: U256,
    /// Per-token amounts submitted to the pool. Only `target_index` is non-zero.
    pub amounts: Vec<U256>,
}

impl LiquidityPlan {
    pub fn target_amount(&self) -> U256 {
        self.amounts
            .get(self.target_index)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_single_sided(&self) -> bool {
        self.amounts
            .iter()
            .enumerate()
            .all(|(i, amount)| (i == self.target_index) != amount.is_zero())
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub plan: LiquidityPlan,
    pub shortfalls: Vec<BasketFundingShortfall>,
    pub minted: U256,
}

struct Resolved {
    pool: Address,
    tokens: Vec<Address>,
    target_token: Address,
    counterpart: PoolChoice,
    router: Address,
    amount_for_sell: U256,
}

pub struct LiquidityBootstrap<'a, C: ?Sized> {
    chain: &'a C,
    oracle: PriceOracleAdapter<'a, C>,
    chain_config: &'a ChainConfig,
    native_per_token: U256,
}

impl<'a, C> LiquidityBootstrap<'a, C>
where
    C: Ledger + SwapOps + TokenOps + PriceDiscovery + ?Sized,
{
    pub fn new(
        chain: &'a C,
        calculator: Address,
        chain_config: &'a ChainConfig,
        basket_native_per_token: u64,
    ) -> Self {
        Self {
            chain,
            oracle: PriceOracleAdapter::new(chain, calculator),
            chain_config,
            native_per_token: U256::from(basket_native_per_token) * U256::from(NATIVE_UNIT),
        }
    }

    /// Buys every basket token with native currency. A failed purchase is recorded and skipped.
    pub async fn fund_basket(&self, actor: Actor) -> Vec<BasketFundingShortfall> {
        let router = self.chain_config.funding_router();
        let mut shortfalls = Vec::new();
        for &token in &self.chain_config.funding_basket {
            match self
                .chain
                .swap_exact_native_input(actor, router, token, self.native_per_token)
                .await
            {
                Ok(bought) => {
                    tracing::debug!("[BOOTSTRAP] Basket: bought {} of {:#x}", bought, token);
                }
                Err(err) => {
                    tracing::warn!("[BOOTSTRAP] Basket: could not buy {:#x}: {}", token, err);
                    shortfalls.push(BasketFundingShortfall {
                        token,
                        reason: err.to_string(),
                    });
                }
            }
        }
        shortfalls
    }

    pub async fn bootstrap(&self, request: &BootstrapRequest) -> Result<BootstrapOutcome> {
        let shortfalls = self.fund_basket(request.actor).await;

        let Resolved {
            pool,
            tokens,
            target_token,
            counterpart,
            router,
            amount_for_sell,
        } = self
            .resolve(request)
            .await
            .map_err(|e| HarnessError::at_stage(BootstrapStage::Resolve, e))?;

        self.ensure_funded(request.actor, counterpart.counterpart, amount_for_sell)
            .await
            .map_err(|e| HarnessError::at_stage(BootstrapStage::Fund, e))?;

        self.trade(
            request.actor,
            router,
            counterpart.counterpart,
            target_token,
            amount_for_sell,
        )
        .await
        .map_err(|e| HarnessError::at_stage(BootstrapStage::Trade, e))?;

        let (amounts, minted) = self
            .add_single_sided(request, pool, &tokens, target_token)
            .await
            .map_err(|e| HarnessError::at_stage(BootstrapStage::AddLiquidity, e))?;

        tracing::info!(
            "[BOOTSTRAP] Preparations completed: minted {} LP of {:#x}",
            minted,
            request.lp_token
        );
        Ok(BootstrapOutcome {
            plan: LiquidityPlan {
                pool,
                target_index: request.target_index,
                target_token,
                counterpart,
                trade_size_quote: request.base_amount,
                amount_for_sell,
                amounts,
            },
            shortfalls,
            minted,
        })
    }

    async fn resolve(&self, request: &BootstrapRequest) -> Result<Resolved> {
        let tokens = request.tokens.clone();
        let target_token = *tokens.get(request.target_index).ok_or_else(|| {
            HarnessError::Config(format!(
                "target index {} out of range for {} configured tokens",
                request.target_index,
                tokens.len()
            ))
        })?;
        let pool = self.chain.pool_of_lp(request.lp_token).await?;
        let pool_tokens = self.chain.pool_tokens(pool).await?;
        if pool_tokens != tokens {
            return Err(HarnessError::Config(format!(
                "pool {:#x} tokens {:?} do not match the configured set {:?}",
                pool, pool_tokens, tokens
            )));
        }

        let counterpart = self.oracle.largest_pool(target_token, &[]).await?;
        let venue = self
            .chain_config
            .venue_by_factory(counterpart.factory)
            .ok_or(RouteError::MissingRouter {
                factory: counterpart.factory,
            })?;
        let router = venue.router;
        let amount_for_sell = self
            .oracle
            .amount_for_quote(counterpart.counterpart, request.base_amount)
            .await?;
        tracing::info!(
            "[BOOTSTRAP] Target {:#x} via {} ({:#x}); selling {} of counterpart {:#x}",
            target_token,
            venue.name,
            router,
            amount_for_sell,
            counterpart.counterpart
        );
        Ok(Resolved {
            pool,
            tokens,
            target_token,
            counterpart,
            router,
            amount_for_sell,
        })
    }

    async fn ensure_funded(&self, actor: Actor, token: Address, needed: U256) -> Result<()> {
        let held = self.chain.balance_of(token, actor.address).await?;
        if held < needed {
            return Err(HarnessError::InsufficientFunds { token, held, needed });
        }
        Ok(())
    }

    async fn trade(
        &self,
        actor: Actor,
        router: Address,
        sell: Address,
        buy: Address,
        amount: U256,
    ) -> Result<U256> {
        self.chain.approve(actor, sell, router, amount).await?;
        let bought = self
            .chain
            .swap_exact_input(actor, router, sell, buy, amount)
            .await?;
        tracing::debug!("[BOOTSTRAP] Bought {} of {:#x}", bought, buy);
        Ok(bought)
    }

    async fn add_single_sided(
        &self,
        request: &BootstrapRequest,
        pool: Address,
        tokens: &[Address],
        target_token: Address,
    ) -> Result<(Vec<U256>, U256)> {
        let available = self
            .chain
            .balance_of(target_token, request.actor.address)
            .await?;
        tracing::info!("[BOOTSTRAP] availBal {}", available);

        let mut amounts = vec![U256::ZERO; tokens.len()];
        amounts[request.target_index] = available;

        self.chain
            .approve(request.actor, target_token, pool, available)
            .await?;
        let deadline = self.chain.timestamp().await?;
        tracing::info!("[BOOTSTRAP] Adding liquidity to {:#x}", pool);
        let minted = self
            .chain
            .add_liquidity(request.actor, pool, &amounts, U256::ZERO, deadline)
            .await?;
        Ok((amounts, minted))
    }
}
