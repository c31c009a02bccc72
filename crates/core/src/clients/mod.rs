pub mod channel_manager;
pub mod competitor_rates;
