pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod repository;
pub mod single_flight;

#[cfg(test)]
mod testing;
