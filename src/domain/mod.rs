pub mod audit;
pub mod cache;
pub mod metrics;
pub mod pools;
pub mod quota;
