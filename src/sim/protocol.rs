//! Protocol contracts of the simulated ledger: controller, fee forwarder, bookkeeper, vaults
//! and strategies.
//!
//! Strategy rewards accrue on the staked position as `pending`. A harvest moves `pending` into
//! a vesting stream that is released into the stake over the vault's reward delay, minus the
//! controller's profit share. `readyToClaim` reports `pending + streaming`.

use super::world::{units, World};
use crate::error::{HarnessError, Result};
use crate::ledger::{ContractArg, CoreHandles, VaultInfo};
use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;

const SECONDS_PER_YEAR: u64 = 31_536_000;
const BPS: u64 = 10_000;
const PERMILLE: u64 = 1_000;
pub const DEFAULT_STRATEGY_APR_BPS: u64 = 2_000;
const REWARD_TOKEN_SUPPLY: u64 = 1_000_000;
const REWARD_TOKEN_QUOTE_RESERVE: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct Controller {
    pub admin: Address,
    pub reward_token: Address,
    pub forwarder: Address,
    pub bookkeeper: Address,
    pub reward_delay: u64,
    pub profit_share_permille: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    pub controller: Address,
    /// (from, to) -> (hops, routers)
    pub paths: BTreeMap<(Address, Address), (Vec<Address>, Vec<Address>)>,
}

#[derive(Debug, Clone)]
pub struct Vault {
    pub name: String,
    pub controller: Address,
    pub underlying: Address,
    pub reward_delay: u64,
    pub strategy: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub controller: Address,
    pub vault: Address,
    pub underlying: Address,
    pub assets: Vec<Address>,
    pub pool_id: String,
    /// Venue the underlying is staked on.
    pub reward_pool: Address,
    pub staked: U256,
    pub pending: U256,
    pub streaming: U256,
    pub apr_bps: u64,
    pub paused: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Protocol {
    pub controllers: BTreeMap<Address, Controller>,
    pub forwarders: BTreeMap<Address, Forwarder>,
    /// bookkeeper -> registered vaults
    pub bookkeepers: BTreeMap<Address, Vec<Address>>,
    pub vaults: BTreeMap<Address, Vault>,
    pub strategies: BTreeMap<Address, Strategy>,
}

fn unknown(kind: &str, address: Address) -> HarnessError {
    HarnessError::reverted(kind, format!("{address:#x} is not a {kind}"))
}

impl Protocol {
    pub fn controller(&self, address: Address) -> Result<&Controller> {
        self.controllers
            .get(&address)
            .ok_or_else(|| unknown("controller", address))
    }

    pub fn vault(&self, address: Address) -> Result<&Vault> {
        self.vaults
            .get(&address)
            .ok_or_else(|| unknown("vault", address))
    }

    pub fn strategy(&self, address: Address) -> Result<&Strategy> {
        self.strategies
            .get(&address)
            .ok_or_else(|| unknown("strategy", address))
    }

    fn strategy_mut(&mut self, address: Address) -> Result<&mut Strategy> {
        self.strategies
            .get_mut(&address)
            .ok_or_else(|| unknown("strategy", address))
    }

    fn ensure_admin(&self, controller: Address, caller: Address) -> Result<()> {
        if self.controller(controller)?.admin != caller {
            return Err(HarnessError::reverted("onlyController", "Not controller"));
        }
        Ok(())
    }
}

fn expect_address(args: &[ContractArg], index: usize, contract: &str) -> Result<Address> {
    match args.get(index) {
        Some(ContractArg::Address(address)) => Ok(*address),
        other => Err(HarnessError::Deploy(format!(
            "{contract}: argument {index} must be an address, got {other:?}"
        ))),
    }
}

fn expect_str<'a>(args: &'a [ContractArg], index: usize, contract: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(ContractArg::Str(value)) => Ok(value),
        other => Err(HarnessError::Deploy(format!(
            "{contract}: argument {index} must be a string, got {other:?}"
        ))),
    }
}

impl World {
    pub fn deploy_core(
        &mut self,
        admin: Address,
        reward_delay: u64,
        profit_share_permille: u32,
    ) -> Result<CoreHandles> {
        if u64::from(profit_share_permille) > PERMILLE {
            return Err(HarnessError::Deploy(format!(
                "profit share {profit_share_permille} exceeds {PERMILLE} permille"
            )));
        }
        let controller = self.next_address();
        let reward_token = self.deploy_token("TETU", 18);
        let forwarder = self.next_address();
        let bookkeeper = self.next_address();

        self.protocol.controllers.insert(
            controller,
            Controller {
                admin,
                reward_token,
                forwarder,
                bookkeeper,
                reward_delay,
                profit_share_permille,
            },
        );
        self.protocol.forwarders.insert(
            forwarder,
            Forwarder {
                controller,
                paths: BTreeMap::new(),
            },
        );
        self.protocol.bookkeepers.insert(bookkeeper, Vec::new());

        let quote = self.default_output;
        let quote_decimals = self.token(quote)?.decimals;
        self.add_pair(
            self.reward_router,
            reward_token,
            quote,
            units(REWARD_TOKEN_SUPPLY, 18),
            units(REWARD_TOKEN_QUOTE_RESERVE, quote_decimals),
        )?;

        Ok(CoreHandles {
            controller,
            reward_token,
            fee_reward_forwarder: forwarder,
            bookkeeper,
        })
    }

    pub fn deploy_price_calculator(
        &mut self,
        admin: Address,
        controller: Address,
    ) -> Result<Address> {
        self.protocol.ensure_admin(controller, admin)?;
        let calculator = self.next_address();
        self.calculators.insert(calculator);
        Ok(calculator)
    }

    pub fn deploy_contract(
        &mut self,
        admin: Address,
        name: &str,
        args: &[ContractArg],
    ) -> Result<Address> {
        match name {
            "SmartVault" => self.deploy_vault(admin, args),
            strategy if strategy.starts_with("Strategy") => {
                self.deploy_strategy(admin, strategy, args)
            }
            other => Err(HarnessError::Deploy(format!("unknown contract `{other}`"))),
        }
    }

    fn deploy_vault(&mut self, admin: Address, args: &[ContractArg]) -> Result<Address> {
        let name = expect_str(args, 0, "SmartVault")?.to_string();
        let controller = expect_address(args, 1, "SmartVault")?;
        let underlying = expect_address(args, 2, "SmartVault")?;
        let reward_delay = match args.get(3) {
            Some(ContractArg::Uint(delay)) => u64::try_from(*delay).map_err(|_| {
                HarnessError::Deploy(format!("SmartVault: reward delay {delay} out of range"))
            })?,
            other => {
                return Err(HarnessError::Deploy(format!(
                    "SmartVault: argument 3 must be a uint, got {other:?}"
                )))
            }
        };
        self.protocol.ensure_admin(controller, admin)?;
        let underlying_meta = self.token(underlying)?.clone();

        let vault = self.next_address();
        self.register_token(
            vault,
            &format!("x{}", underlying_meta.symbol),
            underlying_meta.decimals,
        );
        self.protocol.vaults.insert(
            vault,
            Vault {
                name,
                controller,
                underlying,
                reward_delay,
                strategy: None,
            },
        );
        Ok(vault)
    }

    fn deploy_strategy(
        &mut self,
        admin: Address,
        name: &str,
        args: &[ContractArg],
    ) -> Result<Address> {
        let controller = expect_address(args, 0, name)?;
        let vault = expect_address(args, 1, name)?;
        let underlying = expect_address(args, 2, name)?;
        let assets = match args.get(3) {
            Some(ContractArg::Addresses(tokens)) => tokens.clone(),
            other => {
                return Err(HarnessError::Deploy(format!(
                    "{name}: argument 3 must be an address list, got {other:?}"
                )))
            }
        };
        let pool_id = expect_str(args, 4, name)?.to_string();
        self.protocol.ensure_admin(controller, admin)?;
        if self.protocol.vault(vault)?.underlying != underlying {
            return Err(HarnessError::Deploy(format!(
                "{name}: underlying {underlying:#x} does not match vault {vault:#x}"
            )));
        }

        let strategy = self.next_address();
        let reward_pool = self.next_address();
        self.protocol.strategies.insert(
            strategy,
            Strategy {
                name: name.to_string(),
                controller,
                vault,
                underlying,
                assets,
                pool_id,
                reward_pool,
                staked: U256::ZERO,
                pending: U256::ZERO,
                streaming: U256::ZERO,
                apr_bps: DEFAULT_STRATEGY_APR_BPS,
                paused: false,
            },
        );
        Ok(strategy)
    }

    pub fn add_vault_and_strategy(
        &mut self,
        admin: Address,
        controller: Address,
        vault: Address,
        strategy: Address,
    ) -> Result<()> {
        self.protocol.ensure_admin(controller, admin)?;
        let bookkeeper = self.protocol.controller(controller)?.bookkeeper;
        if self.protocol.strategy(strategy)?.vault != vault {
            return Err(HarnessError::reverted(
                "addVaultAndStrategy",
                "strategy is bound to another vault",
            ));
        }
        let entry = self
            .protocol
            .vaults
            .get_mut(&vault)
            .ok_or_else(|| unknown("vault", vault))?;
        if entry.strategy.is_some() {
            return Err(HarnessError::reverted(
                "addVaultAndStrategy",
                "vault already has a strategy",
            ));
        }
        entry.strategy = Some(strategy);
        self.protocol
            .bookkeepers
            .entry(bookkeeper)
            .or_default()
            .push(vault);
        Ok(())
    }

    pub fn set_conversion_path(
        &mut self,
        admin: Address,
        forwarder: Address,
        hops: &[Address],
        routers: &[Address],
    ) -> Result<()> {
        let controller = self
            .protocol
            .forwarders
            .get(&forwarder)
            .ok_or_else(|| unknown("forwarder", forwarder))?
            .controller;
        self.protocol.ensure_admin(controller, admin)?;
        if hops.len() < 2 || routers.len() + 1 != hops.len() {
            return Err(HarnessError::reverted("setConversionPath", "FRF: Wrong data"));
        }
        let key = (hops[0], hops[hops.len() - 1]);
        if let Some(entry) = self.protocol.forwarders.get_mut(&forwarder) {
            entry.paths.insert(key, (hops.to_vec(), routers.to_vec()));
        }
        Ok(())
    }

    pub fn conversion_path(
        &self,
        forwarder: Address,
        from: Address,
        to: Address,
    ) -> Result<Option<(Vec<Address>, Vec<Address>)>> {
        Ok(self
            .protocol
            .forwarders
            .get(&forwarder)
            .ok_or_else(|| unknown("forwarder", forwarder))?
            .paths
            .get(&(from, to))
            .cloned())
    }

    fn vault_strategy(&self, vault: Address) -> Result<Option<&Strategy>> {
        match self.protocol.vault(vault)?.strategy {
            Some(strategy) => Ok(Some(self.protocol.strategy(strategy)?)),
            None => Ok(None),
        }
    }

    pub fn invested_underlying_balance(&self, strategy: Address) -> Result<U256> {
        let record = self.protocol.strategy(strategy)?;
        Ok(self.db.balance(record.underlying, strategy) + record.staked)
    }

    pub fn underlying_balance_in_vault(&self, vault: Address) -> Result<U256> {
        let underlying = self.protocol.vault(vault)?.underlying;
        Ok(self.db.balance(underlying, vault))
    }

    pub fn underlying_balance_with_investment(&self, vault: Address) -> Result<U256> {
        let idle = self.underlying_balance_in_vault(vault)?;
        let invested = match self.protocol.vault(vault)?.strategy {
            Some(strategy) => self.invested_underlying_balance(strategy)?,
            None => U256::ZERO,
        };
        Ok(idle + invested)
    }

    fn strategy_address(&self, vault: Address) -> Result<Address> {
        self.protocol
            .vault(vault)?
            .strategy
            .ok_or_else(|| HarnessError::reverted("strategy", "vault has no strategy"))
    }

    /// Moves idle vault funds onto the reward venue unless the strategy is paused.
    fn invest_idle(&mut self, vault: Address) -> Result<()> {
        let Some(strategy) = self.protocol.vault(vault)?.strategy else {
            return Ok(());
        };
        let record = self.protocol.strategy(strategy)?;
        if record.paused {
            return Ok(());
        }
        let (underlying, reward_pool) = (record.underlying, record.reward_pool);
        let idle = self.db.balance(underlying, vault);
        if idle.is_zero() {
            return Ok(());
        }
        self.db.transfer(underlying, vault, reward_pool, idle)?;
        self.protocol.strategy_mut(strategy)?.staked += idle;
        Ok(())
    }

    pub fn deposit(&mut self, depositor: Address, vault: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(HarnessError::reverted("deposit", "SV: Zero amount"));
        }
        let underlying = self.protocol.vault(vault)?.underlying;
        let total = self.underlying_balance_with_investment(vault)?;
        let supply = self.db.total_supply(vault);
        let shares = if supply.is_zero() || total.is_zero() {
            amount
        } else {
            amount * supply / total
        };
        if shares.is_zero() {
            return Err(HarnessError::reverted("deposit", "SV: Zero shares"));
        }
        self.db
            .transfer_from(underlying, vault, depositor, vault, amount)?;
        self.db.mint(vault, depositor, shares)?;
        self.invest_idle(vault)
    }

    pub fn withdraw(&mut self, holder: Address, vault: Address, shares: U256) -> Result<()> {
        if shares.is_zero() {
            return Err(HarnessError::reverted("withdraw", "SV: Zero amount"));
        }
        let underlying = self.protocol.vault(vault)?.underlying;
        let total = self.underlying_balance_with_investment(vault)?;
        let supply = self.db.total_supply(vault);
        if supply.is_zero() {
            return Err(HarnessError::reverted("withdraw", "SV: No shares minted"));
        }
        let amount = shares * total / supply;
        self.db.burn(vault, holder, shares)?;

        let idle = self.db.balance(underlying, vault);
        if idle < amount {
            let strategy = self.strategy_address(vault)?;
            self.release_to_vault(strategy, amount - idle)?;
        }
        self.db.transfer(underlying, vault, holder, amount)
    }

    /// Sends up to `amount` from the strategy to its vault, own balance before stake.
    fn release_to_vault(&mut self, strategy: Address, amount: U256) -> Result<()> {
        let record = self.protocol.strategy(strategy)?;
        let (underlying, vault, reward_pool, staked) = (
            record.underlying,
            record.vault,
            record.reward_pool,
            record.staked,
        );
        let held = self.db.balance(underlying, strategy);
        let from_held = held.min(amount);
        if !from_held.is_zero() {
            self.db.transfer(underlying, strategy, vault, from_held)?;
        }
        let from_stake = (amount - from_held).min(staked);
        if !from_stake.is_zero() {
            self.db.transfer(underlying, reward_pool, vault, from_stake)?;
            self.protocol.strategy_mut(strategy)?.staked -= from_stake;
        }
        Ok(())
    }

    pub fn harvest(&mut self, caller: Address, strategy: Address) -> Result<()> {
        let record = self.protocol.strategy(strategy)?;
        let (controller, vault, paused) = (record.controller, record.vault, record.paused);
        self.protocol.ensure_admin(controller, caller)?;
        if paused {
            return Err(HarnessError::reverted("doHardWork", "SB: Paused"));
        }
        self.invest_idle(vault)?;
        let record = self.protocol.strategy_mut(strategy)?;
        record.streaming += record.pending;
        record.pending = U256::ZERO;
        Ok(())
    }

    pub fn emergency_exit(&mut self, caller: Address, strategy: Address) -> Result<()> {
        let record = self.protocol.strategy(strategy)?;
        let controller = record.controller;
        self.protocol.ensure_admin(controller, caller)?;
        let everything = self.invested_underlying_balance(strategy)?;
        self.release_to_vault(strategy, everything)?;
        self.protocol.strategy_mut(strategy)?.paused = true;
        Ok(())
    }

    pub fn ready_to_claim(&self, strategy: Address) -> Result<U256> {
        let record = self.protocol.strategy(strategy)?;
        Ok(record.pending + record.streaming)
    }

    pub(crate) fn accrue_strategies(&mut self, elapsed: u64) -> Result<()> {
        if elapsed == 0 {
            return Ok(());
        }
        let addresses: Vec<Address> = self.protocol.strategies.keys().copied().collect();
        for strategy in addresses {
            self.accrue(strategy, elapsed)?;
        }
        Ok(())
    }

    fn accrue(&mut self, strategy: Address, elapsed: u64) -> Result<()> {
        let record = self.protocol.strategy(strategy)?.clone();
        let controller = self.protocol.controller(record.controller)?;
        let forwarder = controller.forwarder;
        let profit_share = U256::from(controller.profit_share_permille);
        let delay = self.protocol.vault(record.vault)?.reward_delay;

        let released = if delay == 0 || elapsed >= delay {
            record.streaming
        } else {
            record.streaming * U256::from(elapsed) / U256::from(delay)
        };
        let fee = released * profit_share / U256::from(PERMILLE);
        let net = released - fee;
        let accrued = if record.paused {
            U256::ZERO
        } else {
            record.staked * U256::from(record.apr_bps) * U256::from(elapsed)
                / U256::from(BPS * SECONDS_PER_YEAR)
        };

        if !fee.is_zero() {
            self.db.mint(record.underlying, forwarder, fee)?;
        }
        let destination = if record.paused {
            record.vault
        } else {
            record.reward_pool
        };
        if !net.is_zero() {
            self.db.mint(record.underlying, destination, net)?;
        }

        let entry = self.protocol.strategy_mut(strategy)?;
        entry.streaming -= released;
        entry.pending += accrued;
        if !record.paused {
            entry.staked += net;
        }
        Ok(())
    }

    pub fn reward_pool_balance(&self, strategy: Address) -> Result<U256> {
        Ok(self.protocol.strategy(strategy)?.staked)
    }

    pub fn vault_info(&self, vault: Address) -> Result<VaultInfo> {
        let record = self.protocol.vault(vault)?;
        let assets = match self.vault_strategy(vault)? {
            Some(strategy) => strategy.assets.clone(),
            None => vec![record.underlying],
        };
        Ok(VaultInfo {
            name: record.name.clone(),
            underlying: record.underlying,
            assets,
        })
    }

    pub fn vaults(&self, bookkeeper: Address) -> Result<Vec<Address>> {
        self.protocol
            .bookkeepers
            .get(&bookkeeper)
            .cloned()
            .ok_or_else(|| unknown("bookkeeper", bookkeeper))
    }
}
