use alloy::primitives::Address;

pub const POLYGON_CHAIN_ID: u64 = 137;

/// A swap factory together with the router that trades its pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapVenue {
    pub name: &'static str,
    pub factory: Address,
    pub router: Address,
}

/// Static address book for a chain the harness knows how to bootstrap against.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub wrapped_native: Address,
    /// Intermediate quote token every reward route passes through.
    pub quote_token: Address,
    /// Router used for the last hop into the protocol reward token.
    pub reward_router: Address,
    pub venues: Vec<SwapVenue>,
    /// Tokens a test actor buys with native currency before any bootstrap trade.
    pub funding_basket: Vec<Address>,
}

impl ChainConfig {
    pub fn polygon() -> Self {
        Self {
            chain_id: POLYGON_CHAIN_ID,
            name: "Polygon".to_string(),
            wrapped_native: polygon::WMATIC,
            quote_token: polygon::USDC,
            reward_router: polygon::QUICK_ROUTER,
            venues: vec![
                SwapVenue {
                    name: "quickswap",
                    factory: polygon::QUICK_FACTORY,
                    router: polygon::QUICK_ROUTER,
                },
                SwapVenue {
                    name: "sushiswap",
                    factory: polygon::SUSHI_FACTORY,
                    router: polygon::SUSHI_ROUTER,
                },
                SwapVenue {
                    name: "dfyn",
                    factory: polygon::DFYN_FACTORY,
                    router: polygon::DFYN_ROUTER,
                },
            ],
            funding_basket: vec![
                polygon::USDC,
                polygon::USDT,
                polygon::DAI,
                polygon::WETH,
                polygon::WBTC,
                polygon::MAI,
            ],
        }
    }

    pub fn venue_by_factory(&self, factory: Address) -> Option<&SwapVenue> {
        self.venues.iter().find(|venue| venue.factory == factory)
    }

    pub fn router_by_factory(&self, factory: Address) -> Option<Address> {
        self.venue_by_factory(factory).map(|venue| venue.router)
    }

    /// Router the funding basket is bought through.
    pub fn funding_router(&self) -> Address {
        self.reward_router
    }
}

pub mod polygon {
    use alloy::primitives::{address, Address};

    pub const WMATIC: Address = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");
    pub const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
    pub const USDT: Address = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");
    pub const DAI: Address = address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063");
    pub const WETH: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");
    pub const WBTC: Address = address!("1BFD67037B42Cf73acF2047067bd4F2C47D9BfD6");
    pub const MAI: Address = address!("a3Fa99A148fA48D14Ed51d610c367C61876997F1");
    pub const ICE: Address = address!("4A81f8796e0c6Ad4877A51C86693B0dE8093F2ef");

    pub const QUICK_FACTORY: Address = address!("5757371414417b8C6CAad45bAeF941aBc7d3Ab32");
    pub const QUICK_ROUTER: Address = address!("a5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff");
    pub const SUSHI_FACTORY: Address = address!("c35DADB65012eC5796536bD9864eD8773aBc74C4");
    pub const SUSHI_ROUTER: Address = address!("1b02dA8Cb0d097eB8D57A175b88c7D8b47997506");
    pub const DFYN_FACTORY: Address = address!("E7Fb3e833eFE5F9c441105EB65Ef8b261266423B");
    pub const DFYN_ROUTER: Address = address!("A102072A4C07F06EC3B4900FDC4C7B80b6c57429");
}
