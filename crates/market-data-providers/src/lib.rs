pub mod binance;
pub mod error;
pub mod normalize;
pub mod provider;
