pub mod black_scholes;
pub mod monte_carlo;
pub mod normal_process;

/// Every option valuation engine implements this trait.
/// Both methods are pure: deterministic output from the contract alone.
/// Send + Sync so one contract can be valued from several worker threads.
pub trait OptionPricer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Present value of one unit of the contract.
    fn price(&self) -> f64;

    /// Sensitivity of `price()` to the spot.
    fn delta(&self) -> f64;
}
