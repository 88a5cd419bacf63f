use std::{fmt::Display, iter::Sum, ops::Add};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::delegate_ops;

//--------------------------------------       Coins       -----------------------------------------------------------
/// A count of the indivisible virtual-currency unit. The value is signed so that ledger rows can
/// record debits as negative amounts; account balances are kept non-negative by the store guards.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Coins(i64);

delegate_ops!(Coins:
    binary Add::add,
    binary Sub::sub,
    inplace AddAssign::add_assign,
    inplace SubAssign::sub_assign,
    unary Neg::neg,
);

impl Sum for Coins {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as coins: {0}")]
pub struct CoinsConversionError(String);

impl From<i64> for Coins {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Coins {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Coins {}

impl TryFrom<u64> for Coins {
    type Error = CoinsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CoinsConversionError(format!("Value {value} is too large to convert to Coins")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Coins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} coin(s)", self.0)
    }
}

impl Coins {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}
