//! ERC-20 and native balances kept in a `revm` cache database.
//!
//! Token contracts use the canonical Solidity layout: `balanceOf` at slot 0, `allowance` at
//! slot 1 (nested mapping), `totalSupply` at slot 2.

use crate::error::{HarnessError, Result};
use alloy::primitives::{Address, U256};
use revm::db::{CacheDB, EmptyDB};
use revm::primitives::{keccak256, Address as RAddress, U256 as RU256};
use revm::DatabaseRef;

const BALANCES_SLOT: u64 = 0;
const ALLOWANCES_SLOT: u64 = 1;
const TOTAL_SUPPLY_SLOT: u64 = 2;

fn to_revm_address(address: Address) -> RAddress {
    RAddress::from_slice(address.as_slice())
}

fn to_revm_word(value: U256) -> RU256 {
    RU256::from_be_bytes(value.to_be_bytes::<32>())
}

fn from_revm_word(value: RU256) -> U256 {
    U256::from_be_bytes(value.to_be_bytes::<32>())
}

/// `keccak256(pad32(key) ++ slot)`
pub fn mapping_slot(key: Address, slot: RU256) -> RU256 {
    let mut input = [0u8; 64];
    input[12..32].copy_from_slice(key.as_slice());
    input[32..64].copy_from_slice(&slot.to_be_bytes::<32>());
    RU256::from_be_bytes(keccak256(input).0)
}

pub fn erc20_balance_slot(owner: Address) -> RU256 {
    mapping_slot(owner, RU256::from(BALANCES_SLOT))
}

pub fn erc20_allowance_slot(owner: Address, spender: Address) -> RU256 {
    mapping_slot(spender, mapping_slot(owner, RU256::from(ALLOWANCES_SLOT)))
}

#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: CacheDB<EmptyDB>,
}

impl Default for LedgerDb {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerDb {
    pub fn new() -> Self {
        Self {
            db: CacheDB::new(EmptyDB::default()),
        }
    }

    fn read_slot(&self, contract: Address, slot: RU256) -> U256 {
        self.db
            .storage_ref(to_revm_address(contract), slot)
            .map(from_revm_word)
            .unwrap_or_default()
    }

    fn write_slot(&mut self, contract: Address, slot: RU256, value: U256) -> Result<()> {
        self.db
            .insert_account_storage(to_revm_address(contract), slot, to_revm_word(value))
            .map_err(|e| HarnessError::reverted("sstore", e.to_string()))
    }

    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        self.read_slot(token, erc20_balance_slot(owner))
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.read_slot(token, erc20_allowance_slot(owner, spender))
    }

    pub fn total_supply(&self, token: Address) -> U256 {
        self.read_slot(token, RU256::from(TOTAL_SUPPLY_SLOT))
    }

    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        self.write_slot(token, erc20_allowance_slot(owner, spender), amount)
    }

    pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<()> {
        let supply = self
            .total_supply(token)
            .checked_add(amount)
            .ok_or_else(|| HarnessError::reverted("mint", "total supply overflow"))?;
        let balance = self.balance(token, to) + amount;
        self.write_slot(token, RU256::from(TOTAL_SUPPLY_SLOT), supply)?;
        self.write_slot(token, erc20_balance_slot(to), balance)
    }

    pub fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<()> {
        let balance = self.balance(token, from);
        if balance < amount {
            return Err(HarnessError::reverted(
                "burn",
                "ERC20: burn amount exceeds balance",
            ));
        }
        let supply = self.total_supply(token).saturating_sub(amount);
        self.write_slot(token, erc20_balance_slot(from), balance - amount)?;
        self.write_slot(token, RU256::from(TOTAL_SUPPLY_SLOT), supply)
    }

    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let from_balance = self.balance(token, from);
        if from_balance < amount {
            return Err(HarnessError::reverted(
                "transfer",
                "ERC20: transfer amount exceeds balance",
            ));
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self.balance(token, to);
        self.write_slot(token, erc20_balance_slot(from), from_balance - amount)?;
        self.write_slot(token, erc20_balance_slot(to), to_balance + amount)
    }

    /// `transferFrom` executed by `spender`. An allowance of `U256::MAX` is never decremented.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let allowance = self.allowance(token, from, spender);
        if allowance < amount {
            return Err(HarnessError::reverted(
                "transferFrom",
                "ERC20: insufficient allowance",
            ));
        }
        if allowance != U256::MAX {
            self.approve(token, from, spender, allowance - amount)?;
        }
        self.transfer(token, from, to, amount)
    }

    pub fn native_balance(&self, owner: Address) -> U256 {
        self.db
            .basic_ref(to_revm_address(owner))
            .ok()
            .flatten()
            .map(|info| from_revm_word(info.balance))
            .unwrap_or_default()
    }

    pub fn set_native_balance(&mut self, owner: Address, balance: U256) {
        let owner_r = to_revm_address(owner);
        let mut info = self
            .db
            .basic_ref(owner_r)
            .ok()
            .flatten()
            .unwrap_or_default();
        info.balance = to_revm_word(balance);
        self.db.insert_account_info(owner_r, info);
    }

    /// Debits native currency, reverting when `owner` cannot cover `amount`.
    pub fn spend_native(&mut self, owner: Address, amount: U256) -> Result<()> {
        let balance = self.native_balance(owner);
        if balance < amount {
            return Err(HarnessError::reverted(
                "value transfer",
                "insufficient native balance",
            ));
        }
        self.set_native_balance(owner, balance - amount);
        Ok(())
    }
}
