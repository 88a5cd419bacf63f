mod coins;
pub mod idgen;
pub mod ops;

pub use coins::{Coins, CoinsConversionError};
pub use idgen::IdGenerator;
