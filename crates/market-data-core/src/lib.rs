pub mod candle;
pub mod error;
pub mod memory;
pub mod schema;
pub mod store;
pub mod summary;
