//! Polygon-like environment: the basket tokens, three swap venues with seeded pairs, and the
//! four-token stable pool whose LP token the reference strategy farms.

use super::world::{units, StablePool, World};
use super::SimChain;
use crate::config::chains::{polygon, ChainConfig};
use crate::error::Result;
use crate::harness::{ConversionTargets, StrategyDescriptor};
use alloy::primitives::Address;

const STABLE_POOL_SEED: u64 = 5_000_000;
const STABLE_POOL_SYMBOL: &str = "IS3USD";

const TOKENS: &[(Address, &str, u8)] = &[
    (polygon::USDC, "USDC", 6),
    (polygon::USDT, "USDT", 6),
    (polygon::DAI, "DAI", 18),
    (polygon::WETH, "WETH", 18),
    (polygon::WBTC, "WBTC", 8),
    (polygon::MAI, "miMATIC", 18),
    (polygon::ICE, "ICE", 18),
];

/// (router, token a, token b, whole units of a, whole units of b)
const PAIRS: &[(Address, Address, Address, u64, u64)] = &[
    (polygon::QUICK_ROUTER, polygon::WMATIC, polygon::USDC, 20_000_000, 20_000_000),
    (polygon::QUICK_ROUTER, polygon::WMATIC, polygon::WETH, 20_000_000, 10_000),
    (polygon::QUICK_ROUTER, polygon::WETH, polygon::USDC, 10_000, 20_000_000),
    (polygon::QUICK_ROUTER, polygon::WBTC, polygon::WETH, 300, 4_500),
    (polygon::QUICK_ROUTER, polygon::WMATIC, polygon::USDT, 5_000_000, 5_000_000),
    (polygon::QUICK_ROUTER, polygon::WMATIC, polygon::DAI, 5_000_000, 5_000_000),
    (polygon::QUICK_ROUTER, polygon::USDC, polygon::USDT, 10_000_000, 10_000_000),
    (polygon::QUICK_ROUTER, polygon::USDC, polygon::DAI, 5_000_000, 5_000_000),
    (polygon::QUICK_ROUTER, polygon::USDC, polygon::MAI, 3_000_000, 3_000_000),
    (polygon::SUSHI_ROUTER, polygon::WMATIC, polygon::USDC, 2_000_000, 2_000_000),
    (polygon::SUSHI_ROUTER, polygon::USDC, polygon::USDT, 1_000_000, 1_000_000),
    (polygon::SUSHI_ROUTER, polygon::WETH, polygon::USDC, 500, 1_000_000),
    (polygon::DFYN_ROUTER, polygon::ICE, polygon::USDC, 1_000_000, 500_000),
];

fn decimals_of(world: &World, token: Address) -> Result<u8> {
    Ok(world.token(token)?.decimals)
}

pub fn polygon_world(config: &ChainConfig) -> Result<(World, StablePool)> {
    let mut world = World::new(
        config.wrapped_native,
        "WMATIC",
        config.quote_token,
        config.reward_router,
    );
    for &(address, symbol, decimals) in TOKENS {
        world.register_token(address, symbol, decimals);
    }
    for venue in &config.venues {
        world.add_venue(venue.factory, venue.router);
    }
    for &(router, a, b, whole_a, whole_b) in PAIRS {
        let reserve_a = units(whole_a, decimals_of(&world, a)?);
        let reserve_b = units(whole_b, decimals_of(&world, b)?);
        world.add_pair(router, a, b, reserve_a, reserve_b)?;
    }

    let pool = world.add_stable_pool(
        STABLE_POOL_SYMBOL,
        vec![polygon::USDC, polygon::USDT, polygon::DAI, polygon::MAI],
    )?;
    let seeder = Address::with_last_byte(0x5e);
    for &token in &pool.tokens {
        let seed = units(STABLE_POOL_SEED, decimals_of(&world, token)?);
        world.db.mint(token, pool.address, seed)?;
    }
    let seeded_lp = units(STABLE_POOL_SEED * pool.tokens.len() as u64, 18);
    world.db.mint(pool.lp_token, seeder, seeded_lp)?;
    Ok((world, pool))
}

/// Simulated Polygon plus the addresses a strategy harness needs from it.
#[derive(Clone)]
pub struct PolygonFixture {
    pub chain: SimChain,
    pub config: ChainConfig,
    pub stable_pool: Address,
    pub lp_token: Address,
}

impl PolygonFixture {
    pub fn build() -> Result<Self> {
        let config = ChainConfig::polygon();
        let (world, pool) = polygon_world(&config)?;
        tracing::debug!(
            "[SIM] Polygon fixture: {} pool {:#x}, LP {:#x}",
            STABLE_POOL_SYMBOL,
            pool.address,
            pool.lp_token
        );
        Ok(Self {
            chain: SimChain::new(world),
            config,
            stable_pool: pool.address,
            lp_token: pool.lp_token,
        })
    }

    /// Iron stable-swap LP strategy, rewarded in ICE traded on DFYN.
    pub fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            strategy_name: "StrategyIronSwap".to_string(),
            factory: polygon::DFYN_FACTORY,
            underlying: self.lp_token,
            tokens: vec![polygon::USDC, polygon::USDT, polygon::DAI, polygon::MAI],
            token_names: ["USDC", "USDT", "DAI", "MAI"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            platform_pool_identifier: "IRON_IS3USD".to_string(),
        }
    }

    pub fn reward_tokens(&self) -> Vec<Address> {
        vec![polygon::ICE]
    }

    pub fn conversion_targets(&self) -> ConversionTargets {
        ConversionTargets {
            quote_token: self.config.quote_token,
            protocol_router: self.config.reward_router,
        }
    }
}
