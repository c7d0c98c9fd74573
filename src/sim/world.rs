//! Deterministic world state behind [`super::SimChain`].
//!
//! Everything a transaction can touch lives in one cloneable [`World`]; snapshots are whole
//! clones. Pair reserves are the token balances held at the pair address, so they move with
//! ordinary transfers.

use super::protocol::Protocol;
use super::storage::LedgerDb;
use crate::error::{HarnessError, Result};
use crate::ledger::Actor;
use alloy::primitives::{keccak256, Address, U256};
use std::collections::{BTreeMap, BTreeSet};

pub const ACTOR_COUNT: u8 = 3;
pub const ACTOR_NATIVE_FUNDS: u64 = 10_000_000;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const PRICE_SCALE: u64 = 1_000_000_000_000_000_000;
const LP_DECIMALS: u8 = 18;
const FEE_NUMERATOR: u64 = 997;
const FEE_DENOMINATOR: u64 = 1_000;

pub fn units(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub address: Address,
    pub factory: Address,
    pub token0: Address,
    pub token1: Address,
}

impl Pair {
    fn holds(&self, a: Address, b: Address) -> bool {
        (self.token0 == a && self.token1 == b) || (self.token0 == b && self.token1 == a)
    }

    fn other(&self, token: Address) -> Option<Address> {
        if self.token0 == token {
            Some(self.token1)
        } else if self.token1 == token {
            Some(self.token0)
        } else {
            None
        }
    }
}

/// Multi-token pool that mints LP against single- or multi-sided deposits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StablePool {
    pub address: Address,
    pub lp_token: Address,
    pub tokens: Vec<Address>,
}

#[derive(Debug, Clone)]
pub struct World {
    pub(crate) db: LedgerDb,
    pub(crate) timestamp: u64,
    /// Seconds between submission and inclusion of a transaction.
    pub(crate) inclusion_delay: u64,
    pub(crate) wrapped_native: Address,
    pub(crate) default_output: Address,
    /// Router the protocol reward token is listed on.
    pub(crate) reward_router: Address,
    pub(crate) actors: Vec<Actor>,
    pub(crate) tokens: BTreeMap<Address, TokenMeta>,
    pub(crate) factories: Vec<Address>,
    /// router -> factory
    pub(crate) routers: BTreeMap<Address, Address>,
    pub(crate) pairs: Vec<Pair>,
    pub(crate) stable_pools: BTreeMap<Address, StablePool>,
    pub(crate) lp_to_pool: BTreeMap<Address, Address>,
    pub(crate) calculators: BTreeSet<Address>,
    pub(crate) protocol: Protocol,
    deployer: Address,
    deploy_nonce: u64,
}

impl World {
    pub fn new(
        wrapped_native: Address,
        native_symbol: &str,
        default_output: Address,
        reward_router: Address,
    ) -> Self {
        let mut world = Self {
            db: LedgerDb::new(),
            timestamp: GENESIS_TIMESTAMP,
            inclusion_delay: 0,
            wrapped_native,
            default_output,
            reward_router,
            actors: Vec::new(),
            tokens: BTreeMap::new(),
            factories: Vec::new(),
            routers: BTreeMap::new(),
            pairs: Vec::new(),
            stable_pools: BTreeMap::new(),
            lp_to_pool: BTreeMap::new(),
            calculators: BTreeSet::new(),
            protocol: Protocol::default(),
            deployer: Address::with_last_byte(0xde),
            deploy_nonce: 0,
        };
        world.register_token(wrapped_native, native_symbol, 18);
        for i in 1..=ACTOR_COUNT {
            let actor = Actor::new(Address::left_padding_from(&[0xac, i]));
            world
                .db
                .set_native_balance(actor.address, units(ACTOR_NATIVE_FUNDS, 18));
            world.actors.push(actor);
        }
        world
    }

    pub(crate) fn next_address(&mut self) -> Address {
        let mut preimage = [0u8; 28];
        preimage[..20].copy_from_slice(self.deployer.as_slice());
        preimage[20..].copy_from_slice(&self.deploy_nonce.to_be_bytes());
        self.deploy_nonce += 1;
        Address::from_slice(&keccak256(preimage)[12..])
    }

    pub fn register_token(&mut self, address: Address, symbol: &str, decimals: u8) {
        self.tokens.insert(
            address,
            TokenMeta {
                symbol: symbol.to_string(),
                decimals,
            },
        );
    }

    pub fn deploy_token(&mut self, symbol: &str, decimals: u8) -> Address {
        let address = self.next_address();
        self.register_token(address, symbol, decimals);
        address
    }

    pub fn token(&self, token: Address) -> Result<&TokenMeta> {
        self.tokens
            .get(&token)
            .ok_or_else(|| HarnessError::reverted("token", format!("{token:#x} is not a token")))
    }

    pub fn add_venue(&mut self, factory: Address, router: Address) {
        if !self.factories.contains(&factory) {
            self.factories.push(factory);
        }
        self.routers.insert(router, factory);
    }

    fn factory_of(&self, router: Address) -> Result<Address> {
        self.routers
            .get(&router)
            .copied()
            .ok_or_else(|| HarnessError::reverted("router", format!("{router:#x} is not a router")))
    }

    /// Creates a pair on `router`'s factory and seeds it with raw reserves.
    pub fn add_pair(
        &mut self,
        router: Address,
        token_a: Address,
        token_b: Address,
        reserve_a: U256,
        reserve_b: U256,
    ) -> Result<Address> {
        let factory = self.factory_of(router)?;
        self.token(token_a)?;
        self.token(token_b)?;
        if token_a == token_b || self.find_pair(factory, token_a, token_b).is_some() {
            return Err(HarnessError::reverted(
                "createPair",
                "identical tokens or pair exists",
            ));
        }
        let address = self.next_address();
        self.db.mint(token_a, address, reserve_a)?;
        self.db.mint(token_b, address, reserve_b)?;
        self.pairs.push(Pair {
            address,
            factory,
            token0: token_a,
            token1: token_b,
        });
        Ok(address)
    }

    pub fn find_pair(&self, factory: Address, a: Address, b: Address) -> Option<&Pair> {
        self.pairs
            .iter()
            .find(|pair| pair.factory == factory && pair.holds(a, b))
    }

    pub fn has_pair(&self, router: Address, a: Address, b: Address) -> bool {
        let Some(&factory) = self.routers.get(&router) else {
            return false;
        };
        self.find_pair(factory, a, b).is_some_and(|pair| {
            !self.db.balance(a, pair.address).is_zero()
                && !self.db.balance(b, pair.address).is_zero()
        })
    }

    pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
        let with_fee = amount_in * U256::from(FEE_NUMERATOR);
        let denominator = reserve_in * U256::from(FEE_DENOMINATOR) + with_fee;
        if denominator.is_zero() {
            return U256::ZERO;
        }
        with_fee * reserve_out / denominator
    }

    fn pair_quote(
        &self,
        router: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<(Address, U256)> {
        let factory = self.factory_of(router)?;
        let pair = self
            .find_pair(factory, token_in, token_out)
            .ok_or_else(|| HarnessError::reverted("swap", "UniswapV2Library: PAIR_NOT_FOUND"))?;
        let out = Self::amount_out(
            amount_in,
            self.db.balance(token_in, pair.address),
            self.db.balance(token_out, pair.address),
        );
        if out.is_zero() {
            return Err(HarnessError::reverted(
                "swap",
                "UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT",
            ));
        }
        Ok((pair.address, out))
    }

    pub fn swap_exact_input(
        &mut self,
        trader: Address,
        router: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256> {
        let (pair, out) = self.pair_quote(router, token_in, token_out, amount_in)?;
        self.db
            .transfer_from(token_in, router, trader, pair, amount_in)?;
        self.db.transfer(token_out, pair, trader, out)?;
        Ok(out)
    }

    /// Wraps `value` native into the pair and pays out `token_out`.
    pub fn swap_exact_native_input(
        &mut self,
        trader: Address,
        router: Address,
        token_out: Address,
        value: U256,
    ) -> Result<U256> {
        let wrapped = self.wrapped_native;
        self.db.spend_native(trader, value)?;
        if token_out == wrapped {
            self.db.mint(wrapped, trader, value)?;
            return Ok(value);
        }
        let (pair, out) = self.pair_quote(router, wrapped, token_out, value)?;
        self.db.mint(wrapped, pair, value)?;
        self.db.transfer(token_out, pair, trader, out)?;
        Ok(out)
    }

    /// Registers a stable pool over `tokens` with its own LP token.
    pub fn add_stable_pool(&mut self, lp_symbol: &str, tokens: Vec<Address>) -> Result<StablePool> {
        for &token in &tokens {
            self.token(token)?;
        }
        let lp_token = self.deploy_token(lp_symbol, LP_DECIMALS);
        let address = self.next_address();
        let pool = StablePool {
            address,
            lp_token,
            tokens,
        };
        self.lp_to_pool.insert(lp_token, address);
        self.stable_pools.insert(address, pool.clone());
        Ok(pool)
    }

    pub fn stable_pool(&self, pool: Address) -> Result<&StablePool> {
        self.stable_pools
            .get(&pool)
            .ok_or_else(|| HarnessError::reverted("swap", format!("{pool:#x} is not a pool")))
    }

    pub fn pool_of_lp(&self, lp_token: Address) -> Result<Address> {
        self.lp_to_pool.get(&lp_token).copied().ok_or_else(|| {
            HarnessError::reverted("swap", format!("{lp_token:#x} is not an LP token"))
        })
    }

    fn normalize(&self, token: Address, amount: U256) -> Result<U256> {
        let decimals = self.token(token)?.decimals;
        Ok(if decimals <= LP_DECIMALS {
            amount * U256::from(10u64).pow(U256::from(LP_DECIMALS - decimals))
        } else {
            amount / U256::from(10u64).pow(U256::from(decimals - LP_DECIMALS))
        })
    }

    /// Pulls `amounts` from `provider` and mints LP 1:1 against their 18-decimal value.
    pub fn add_liquidity(
        &mut self,
        provider: Address,
        pool: Address,
        amounts: &[U256],
        min_to_mint: U256,
        deadline: u64,
    ) -> Result<U256> {
        let StablePool {
            lp_token, tokens, ..
        } = self.stable_pool(pool)?.clone();
        if amounts.len() != tokens.len() {
            return Err(HarnessError::reverted(
                "addLiquidity",
                "Amounts must match pooled tokens",
            ));
        }
        let included_at = self.timestamp + self.inclusion_delay;
        if deadline < included_at {
            return Err(HarnessError::LiquidityAddRejected(format!(
                "deadline {deadline} passed before inclusion at {included_at}"
            )));
        }
        let mut minted = U256::ZERO;
        for (&token, &amount) in tokens.iter().zip(amounts) {
            if amount.is_zero() {
                continue;
            }
            self.db
                .transfer_from(token, pool, provider, pool, amount)?;
            minted += self.normalize(token, amount)?;
        }
        if minted.is_zero() {
            return Err(HarnessError::reverted("addLiquidity", "D should increase"));
        }
        if minted < min_to_mint {
            return Err(HarnessError::LiquidityAddRejected(format!(
                "Couldn't mint min requested: {minted} < {min_to_mint}"
            )));
        }
        self.db.mint(lp_token, provider, minted)?;
        Ok(minted)
    }

    pub fn ensure_calculator(&self, calculator: Address) -> Result<()> {
        if self.calculators.contains(&calculator) {
            Ok(())
        } else {
            Err(HarnessError::reverted(
                "priceCalculator",
                format!("{calculator:#x} is not a price calculator"),
            ))
        }
    }

    /// Deepest pair holding `token` as `(counterpart, factory index)`.
    pub fn largest_pool(&self, token: Address, excluded: &[Address]) -> Option<(Address, usize)> {
        let mut best: Option<(U256, Address, usize)> = None;
        for pair in &self.pairs {
            if excluded.contains(&pair.factory) {
                continue;
            }
            let Some(counterpart) = pair.other(token) else {
                continue;
            };
            let reserve = self.db.balance(token, pair.address);
            if reserve.is_zero() || self.db.balance(counterpart, pair.address).is_zero() {
                continue;
            }
            if best.as_ref().map_or(true, |(deepest, _, _)| reserve > *deepest) {
                let index = self.factories.iter().position(|f| *f == pair.factory)?;
                best = Some((reserve, counterpart, index));
            }
        }
        best.map(|(_, counterpart, index)| (counterpart, index))
    }

    pub fn swap_factory(&self, index: usize) -> Result<Address> {
        self.factories.get(index).copied().ok_or_else(|| {
            HarnessError::reverted("swapFactories", format!("no factory at index {index}"))
        })
    }

    /// 1e18-scaled price of one whole `token` in the default output token; zero when unpriceable.
    pub fn price_with_default_output(&self, token: Address) -> Result<U256> {
        let mut visited = BTreeSet::new();
        self.price_via_largest_pool(token, &mut visited)
    }

    fn price_via_largest_pool(
        &self,
        token: Address,
        visited: &mut BTreeSet<Address>,
    ) -> Result<U256> {
        if token == self.default_output {
            return Ok(U256::from(PRICE_SCALE));
        }
        if !visited.insert(token) {
            return Ok(U256::ZERO);
        }
        let Some((counterpart, index)) = self.largest_pool(token, &[]) else {
            return Ok(U256::ZERO);
        };
        let counterpart_price = self.price_via_largest_pool(counterpart, visited)?;
        if counterpart_price.is_zero() {
            return Ok(U256::ZERO);
        }
        let factory = self.swap_factory(index)?;
        let Some(pair) = self.find_pair(factory, token, counterpart) else {
            return Ok(U256::ZERO);
        };
        let token_reserve = self.db.balance(token, pair.address);
        let counterpart_reserve = self.db.balance(counterpart, pair.address);
        let token_unit = units(1, self.token(token)?.decimals);
        let counterpart_unit = units(1, self.token(counterpart)?.decimals);
        Ok(counterpart_reserve * token_unit * counterpart_price / (token_reserve * counterpart_unit))
    }

    pub fn advance_time(&mut self, seconds: u64) -> Result<()> {
        self.timestamp += seconds;
        self.accrue_strategies(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn world_with_venue() -> (World, Address) {
        let router = Address::with_last_byte(0xa1);
        let mut world = World::new(token(0x01), "WNATIVE", token(0x02), router);
        world.register_token(token(0x02), "QUOTE", 6);
        world.register_token(token(0x03), "ALT", 18);
        world.add_venue(Address::with_last_byte(0xf1), router);
        (world, router)
    }

    #[test]
    fn test_constant_product_charges_fee() {
        let reserve = U256::from(1_000_000u64);
        let out = World::amount_out(U256::from(1_000u64), reserve, reserve);
        // 1000 * 0.997 minus price impact
        assert_eq!(out, U256::from(996u64));
    }

    #[test]
    fn test_price_follows_reserves_across_decimals() {
        let (mut world, router) = world_with_venue();
        world
            .add_pair(router, token(0x03), token(0x02), units(1_000, 18), units(2_000, 6))
            .unwrap();
        let price = world.price_with_default_output(token(0x03)).unwrap();
        assert_eq!(price, U256::from(2u64) * U256::from(PRICE_SCALE));
        assert_eq!(
            world.price_with_default_output(token(0x02)).unwrap(),
            U256::from(PRICE_SCALE)
        );
    }

    #[test]
    fn test_largest_pool_skips_excluded_factories() {
        let (mut world, router) = world_with_venue();
        world
            .add_pair(router, token(0x03), token(0x02), units(10, 18), units(10, 6))
            .unwrap();
        assert_eq!(world.largest_pool(token(0x03), &[]), Some((token(0x02), 0)));
        assert_eq!(
            world.largest_pool(token(0x03), &[Address::with_last_byte(0xf1)]),
            None
        );
    }

    #[test]
    fn test_expired_deadline_rejects_liquidity() {
        let (mut world, _) = world_with_venue();
        let pool = world
            .add_stable_pool("LP", vec![token(0x02), token(0x03)])
            .unwrap();
        let amounts = [units(5, 6), U256::ZERO];
        let provider = world.actors[0].address;
        world.db.mint(token(0x02), provider, units(5, 6)).unwrap();
        world
            .db
            .approve(token(0x02), provider, pool.address, U256::MAX)
            .unwrap();
        world.inclusion_delay = 12;

        let now = world.timestamp;
        let err = world
            .add_liquidity(provider, pool.address, &amounts, U256::ZERO, now)
            .unwrap_err();
        assert!(matches!(err, HarnessError::LiquidityAddRejected(_)));

        let minted = world
            .add_liquidity(provider, pool.address, &amounts, U256::ZERO, now + 12)
            .unwrap();
        assert_eq!(minted, units(5, 18));
    }
}
