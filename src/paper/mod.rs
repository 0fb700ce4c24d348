pub mod position;
pub mod strategy;
pub mod tracker;
pub mod trade;
