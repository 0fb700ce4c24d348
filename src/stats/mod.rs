pub mod correlation;
pub mod distribution;
pub mod export;
