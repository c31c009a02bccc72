pub mod clients;
pub mod config;
pub mod domain;
pub mod pricing;
pub mod storage;
pub mod time;

pub use domain::policy::PricingPolicy;
pub use pricing::recommender::recommend_rate;
