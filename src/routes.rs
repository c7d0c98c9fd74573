//! Reward conversion routes.
//!
//! A route is validated when it is built: `hops.len() == venues.len() + 1` and at least one
//! swap. Tradability of each hop is checked against the ledger when the route is registered.

use crate::error::{Result, RouteError};
use crate::ledger::{Actor, ProtocolDeployer, SwapOps};
use alloy::primitives::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// reward -> quote -> protocol reward token
    ToProtocolReward,
    /// reward -> quote
    ToQuote,
}

impl RouteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToProtocolReward => "long",
            Self::ToQuote => "short",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRoute {
    kind: RouteKind,
    hops: Vec<Address>,
    venues: Vec<Address>,
}

impl ConversionRoute {
    pub fn new(kind: RouteKind, hops: Vec<Address>, venues: Vec<Address>) -> Result<Self> {
        if hops.len() < 2 {
            return Err(RouteError::TooShort { hops: hops.len() }.into());
        }
        if venues.len() + 1 != hops.len() {
            return Err(RouteError::LengthMismatch {
                hops: hops.len(),
                venues: venues.len(),
                expected: hops.len() - 1,
            }
            .into());
        }
        Ok(Self { kind, hops, venues })
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn hops(&self) -> &[Address] {
        &self.hops
    }

    pub fn venues(&self) -> &[Address] {
        &self.venues
    }

    pub fn source(&self) -> Address {
        self.hops[0]
    }

    pub fn destination(&self) -> Address {
        self.hops[self.hops.len() - 1]
    }

    /// `(from, to, venue)` for every swap along the route.
    pub fn legs(&self) -> impl Iterator<Item = (Address, Address, Address)> + '_ {
        self.hops
            .windows(2)
            .zip(self.venues.iter())
            .map(|(pair, venue)| (pair[0], pair[1], *venue))
    }
}

/// Registers routes on a fee forwarder after checking every leg can trade.
pub struct RouteRegistrar<'a, C: ?Sized> {
    chain: &'a C,
    admin: Actor,
    forwarder: Address,
}

impl<'a, C> RouteRegistrar<'a, C>
where
    C: SwapOps + ProtocolDeployer + ?Sized,
{
    pub fn new(chain: &'a C, admin: Actor, forwarder: Address) -> Self {
        Self {
            chain,
            admin,
            forwarder,
        }
    }

    pub async fn register(&self, route: &ConversionRoute) -> Result<()> {
        for (from, to, venue) in route.legs() {
            if !self.chain.has_pair(venue, from, to).await? {
                return Err(RouteError::Untradable { from, to, venue }.into());
            }
        }
        self.chain
            .set_conversion_path(self.admin, self.forwarder, route.hops(), route.venues())
            .await?;
        tracing::info!(
            "[HARNESS] Registered {} route {:#x} -> {:#x} ({} hops)",
            route.kind().as_str(),
            route.source(),
            route.destination(),
            route.hops().len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_three_hops_need_two_venues() {
        let err = ConversionRoute::new(
            RouteKind::ToProtocolReward,
            vec![addr(1), addr(2), addr(3)],
            vec![addr(0xa1)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Route(RouteError::LengthMismatch {
                hops: 3,
                venues: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_single_hop_route_is_rejected() {
        let err = ConversionRoute::new(RouteKind::ToQuote, vec![addr(1)], vec![]).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Route(RouteError::TooShort { hops: 1 })
        ));
    }

    #[test]
    fn test_legs_pair_hops_with_venues() {
        let route = ConversionRoute::new(
            RouteKind::ToProtocolReward,
            vec![addr(1), addr(2), addr(3)],
            vec![addr(0xa1), addr(0xa2)],
        )
        .unwrap();
        let legs: Vec<_> = route.legs().collect();
        assert_eq!(
            legs,
            vec![(addr(1), addr(2), addr(0xa1)), (addr(2), addr(3), addr(0xa2))]
        );
        assert_eq!(route.source(), addr(1));
        assert_eq!(route.destination(), addr(3));
    }
}
