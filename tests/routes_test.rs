mod common;

use alloy::primitives::Address;
use harvest_harness::config::chains::polygon;
use harvest_harness::error::{HarnessError, RouteError};
use harvest_harness::ledger::{Ledger, ProtocolDeployer};
use harvest_harness::routes::{ConversionRoute, RouteKind, RouteRegistrar};
use proptest::prelude::*;

fn addresses(count: usize) -> Vec<Address> {
    (0..count)
        .map(|i| Address::with_last_byte(i as u8 + 1))
        .collect()
}

proptest! {
    #[test]
    fn route_accepts_exactly_one_venue_per_swap(hops in 0usize..6, venues in 0usize..6) {
        let built = ConversionRoute::new(RouteKind::ToQuote, addresses(hops), addresses(venues));
        match built {
            Ok(route) => {
                prop_assert!(hops >= 2);
                prop_assert_eq!(venues + 1, hops);
                prop_assert_eq!(route.legs().count(), venues);
            }
            Err(HarnessError::Route(RouteError::TooShort { hops: reported })) => {
                prop_assert!(hops < 2);
                prop_assert_eq!(reported, hops);
            }
            Err(HarnessError::Route(RouteError::LengthMismatch { expected, .. })) => {
                prop_assert!(hops >= 2);
                prop_assert_ne!(venues + 1, hops);
                prop_assert_eq!(expected, hops - 1);
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }
}

#[tokio::test]
async fn test_registration_checks_every_leg() {
    let fixture = common::fixture();
    let chain = &fixture.chain;
    let admin = chain.actors().await.unwrap()[0];
    let core = chain.deploy_core(admin, 60, 1).await.unwrap();
    let registrar = RouteRegistrar::new(chain, admin, core.fee_reward_forwarder);

    let long = ConversionRoute::new(
        RouteKind::ToProtocolReward,
        vec![polygon::ICE, polygon::USDC, core.reward_token],
        vec![polygon::DFYN_ROUTER, polygon::QUICK_ROUTER],
    )
    .unwrap();
    registrar.register(&long).await.expect("tradable route");
    let stored = chain
        .conversion_path(core.fee_reward_forwarder, polygon::ICE, core.reward_token)
        .await
        .unwrap();
    assert_eq!(
        stored,
        Some((long.hops().to_vec(), long.venues().to_vec()))
    );

    // ICE only trades on DFYN.
    let wrong_venue = ConversionRoute::new(
        RouteKind::ToQuote,
        vec![polygon::ICE, polygon::USDC],
        vec![polygon::QUICK_ROUTER],
    )
    .unwrap();
    let err = registrar.register(&wrong_venue).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Route(RouteError::Untradable { venue, .. }) if venue == polygon::QUICK_ROUTER
    ));
    let missing = chain
        .conversion_path(core.fee_reward_forwarder, polygon::ICE, polygon::USDC)
        .await
        .unwrap();
    assert_eq!(missing, None);
}
