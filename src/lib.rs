//! Harvest harness library surface.
//!
//! Deploys a yield strategy and its vault against a ledger environment, seeds the test user
//! with the strategy's underlying LP asset, drives harvest cycles, and checks the vault
//! invariants. Every ledger interaction goes through the capability traits in [`ledger`];
//! [`sim`] provides the in-process environment the suite and tests run against.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod export;
pub mod harness;
pub mod harvest_loop;
pub mod ledger;
pub mod oracle;
pub mod routes;
pub mod sim;
pub mod suite;
pub mod utils;
pub mod verify;
