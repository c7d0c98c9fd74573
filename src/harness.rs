//! Deploys and wires one strategy under test.
//!
//! Build order: protocol core, price discovery, reward conversion routes, vault, strategy,
//! registration with the controller, then the liquidity bootstrap for the test user. Any
//! failure aborts the build; a partially wired harness is never returned.

use crate::bootstrap::{BootstrapOutcome, BootstrapRequest, LiquidityBootstrap};
use crate::config::chains::ChainConfig;
use crate::error::{HarnessError, Result, RouteError};
use crate::ledger::{Actor, Chain, ContractArg, ContractRef, CoreHandles};
use crate::routes::{ConversionRoute, RouteKind, RouteRegistrar};
use crate::utils::config::HarnessConfig;
use alloy::primitives::{Address, U256};

/// Static description of the strategy to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDescriptor {
    /// Contract name passed to the deployer, e.g. `StrategyIronSwap`.
    pub strategy_name: String,
    /// Swap factory whose router trades the reward tokens.
    pub factory: Address,
    pub underlying: Address,
    pub tokens: Vec<Address>,
    pub token_names: Vec<String>,
    pub platform_pool_identifier: String,
}

impl StrategyDescriptor {
    pub fn vault_name(&self) -> String {
        format!("TETU_{}", self.token_names.join("_"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionTargets {
    /// Intermediate token every reward passes through.
    pub quote_token: Address,
    /// Router for the final hop into the protocol reward token.
    pub protocol_router: Address,
}

#[derive(Debug, Clone)]
pub struct StrategyHarness {
    pub underlying: Address,
    pub signer: Actor,
    pub user: Actor,
    pub core: CoreHandles,
    pub vault: ContractRef,
    pub strategy: ContractRef,
    /// Pool token handle when the underlying is itself an LP position.
    pub lp_for_target_token: Option<ContractRef>,
    pub calculator: Address,
    pub routes: Vec<ConversionRoute>,
    pub bootstrap: BootstrapOutcome,
}

pub struct HarnessBuilder<'a, C: ?Sized> {
    chain: &'a C,
    chain_config: &'a ChainConfig,
    config: &'a HarnessConfig,
}

impl<'a, C> HarnessBuilder<'a, C>
where
    C: Chain + ?Sized,
{
    pub fn new(chain: &'a C, chain_config: &'a ChainConfig, config: &'a HarnessConfig) -> Self {
        Self {
            chain,
            chain_config,
            config,
        }
    }

    pub async fn build(
        &self,
        descriptor: &StrategyDescriptor,
        reward_tokens: &[Address],
        targets: &ConversionTargets,
    ) -> Result<StrategyHarness> {
        let actors = self.chain.actors().await?;
        let (signer, user) = match actors.as_slice() {
            [signer, user, ..] => (*signer, *user),
            _ => {
                return Err(HarnessError::Config(format!(
                    "harness needs two actors, ledger exposes {}",
                    actors.len()
                )))
            }
        };

        let core = self
            .chain
            .deploy_core(
                signer,
                self.config.reward_delay_secs,
                self.config.profit_share_permille,
            )
            .await?;
        tracing::info!(
            "[HARNESS] Core deployed: controller={:#x} reward={:#x}",
            core.controller,
            core.reward_token
        );

        let calculator = self
            .chain
            .deploy_price_discovery(signer, core.controller)
            .await?
            .first()
            .copied()
            .ok_or_else(|| HarnessError::Deploy("price discovery returned no service".into()))?;

        let routes = self
            .register_routes(signer, &core, descriptor.factory, reward_tokens, targets)
            .await?;

        let vault = self
            .chain
            .deploy_contract(
                signer,
                "SmartVault",
                &[
                    ContractArg::Str(descriptor.vault_name()),
                    ContractArg::Address(core.controller),
                    ContractArg::Address(descriptor.underlying),
                    ContractArg::Uint(U256::from(self.config.reward_delay_secs)),
                ],
            )
            .await?;
        let strategy = self
            .chain
            .deploy_contract(
                signer,
                &descriptor.strategy_name,
                &[
                    ContractArg::Address(core.controller),
                    ContractArg::Address(vault.address),
                    ContractArg::Address(descriptor.underlying),
                    ContractArg::Addresses(descriptor.tokens.clone()),
                    ContractArg::Str(descriptor.platform_pool_identifier.clone()),
                ],
            )
            .await?;
        self.chain
            .add_vault_and_strategy(signer, core.controller, vault.address, strategy.address)
            .await?;
        tracing::info!(
            "[HARNESS] {} deployed at {:#x} for vault {:#x}",
            descriptor.strategy_name,
            strategy.address,
            vault.address
        );

        let vault = self
            .chain
            .connect(signer, "ISmartVault", vault.address)
            .await?;
        let strategy = self
            .chain
            .connect(signer, "IStrategy", strategy.address)
            .await?;
        let lp_for_target_token = Some(
            self.chain
                .connect(signer, "IIronLpToken", descriptor.underlying)
                .await?,
        );

        let bootstrap = LiquidityBootstrap::new(
            self.chain,
            calculator,
            self.chain_config,
            self.config.basket_native_per_token,
        )
        .bootstrap(&BootstrapRequest {
            actor: user,
            lp_token: descriptor.underlying,
            tokens: descriptor.tokens.clone(),
            target_index: self.config.target_token_index,
            base_amount: self.config.base_amount,
        })
        .await?;

        Ok(StrategyHarness {
            underlying: descriptor.underlying,
            signer,
            user,
            core,
            vault,
            strategy,
            lp_for_target_token,
            calculator,
            routes,
            bootstrap,
        })
    }

    async fn register_routes(
        &self,
        signer: Actor,
        core: &CoreHandles,
        factory: Address,
        reward_tokens: &[Address],
        targets: &ConversionTargets,
    ) -> Result<Vec<ConversionRoute>> {
        let venue = self
            .chain_config
            .router_by_factory(factory)
            .ok_or(RouteError::MissingRouter { factory })?;
        let registrar = RouteRegistrar::new(self.chain, signer, core.fee_reward_forwarder);

        let mut routes = Vec::with_capacity(reward_tokens.len() * 2);
        for &reward in reward_tokens {
            let long = ConversionRoute::new(
                RouteKind::ToProtocolReward,
                vec![reward, targets.quote_token, core.reward_token],
                vec![venue, targets.protocol_router],
            )?;
            let short = ConversionRoute::new(
                RouteKind::ToQuote,
                vec![reward, targets.quote_token],
                vec![venue],
            )?;
            registrar.register(&long).await?;
            registrar.register(&short).await?;
            routes.push(long);
            routes.push(short);
        }
        Ok(routes)
    }
}

impl StrategyHarness {
    pub fn vault_address(&self) -> Address {
        self.vault.address
    }

    pub fn strategy_address(&self) -> Address {
        self.strategy.address
    }
}
