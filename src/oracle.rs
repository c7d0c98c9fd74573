//! Price and liquidity discovery for bootstrap sizing.

use crate::error::{HarnessError, OracleError, Result};
use crate::ledger::{PriceDiscovery, TokenOps};
use alloy::primitives::{Address, U256};
use std::fmt;

const PRICE_SCALE: u64 = 1_000_000_000_000_000_000;

/// Quote-currency price of one whole token, fixed-point with 18 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(U256);

impl Price {
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Lossy view for logs only.
    pub fn as_f64(self) -> f64 {
        match u128::try_from(self.0) {
            Ok(raw) => raw as f64 / PRICE_SCALE as f64,
            Err(_) => f64::INFINITY,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_f64())
    }
}

/// Deepest venue found for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolChoice {
    pub counterpart: Address,
    pub factory_index: usize,
    pub factory: Address,
}

/// Whole quote units divided by `price`, expressed in raw units of a token with `decimals`
/// places. Rounds down so the result never overstates what can be spent.
pub fn quote_to_token_amount(quote_amount: u64, price: Price, decimals: u8) -> Result<U256> {
    if price.is_zero() {
        return Err(HarnessError::Config(
            "cannot size a trade against a zero price".to_string(),
        ));
    }
    U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .and_then(|unit| U256::from(quote_amount).checked_mul(unit))
        .and_then(|v| v.checked_mul(U256::from(PRICE_SCALE)))
        .map(|numerator| numerator / price.raw())
        .ok_or_else(|| {
            HarnessError::Config(format!(
                "trade size {quote_amount} overflows at {decimals} decimals"
            ))
        })
}

pub struct PriceOracleAdapter<'a, C: ?Sized> {
    chain: &'a C,
    calculator: Address,
}

impl<'a, C> PriceOracleAdapter<'a, C>
where
    C: PriceDiscovery + TokenOps + ?Sized,
{
    pub fn new(chain: &'a C, calculator: Address) -> Self {
        Self { chain, calculator }
    }

    pub fn calculator(&self) -> Address {
        self.calculator
    }

    pub async fn largest_pool(&self, token: Address, excluded: &[Address]) -> Result<PoolChoice> {
        let (counterpart, factory_index) = self
            .chain
            .largest_pool(self.calculator, token, excluded)
            .await?
            .ok_or(OracleError::NoLiquidityFound { token })?;
        let factory = self
            .chain
            .swap_factory(self.calculator, factory_index)
            .await?;
        tracing::debug!(
            "[ORACLE] Largest pool for {:#x}: counterpart={:#x} factory#{}={:#x}",
            token,
            counterpart,
            factory_index,
            factory
        );
        Ok(PoolChoice {
            counterpart,
            factory_index,
            factory,
        })
    }

    pub async fn price(&self, token: Address) -> Result<Price> {
        let raw = self
            .chain
            .price_with_default_output(self.calculator, token)
            .await?;
        let price = Price::from_raw(raw);
        if price.is_zero() {
            return Err(OracleError::NoLiquidityFound { token }.into());
        }
        Ok(price)
    }

    /// Raw amount of `token` worth `quote_amount` whole quote units, rounded down.
    pub async fn amount_for_quote(&self, token: Address, quote_amount: u64) -> Result<U256> {
        let price = self.price(token).await?;
        let decimals = self.chain.decimals(token).await?;
        let symbol = self.chain.symbol(token).await?;
        tracing::info!("[ORACLE] {} price {} (decimals={})", symbol, price, decimals);
        quote_to_token_amount(quote_amount, price, decimals)
    }
}
