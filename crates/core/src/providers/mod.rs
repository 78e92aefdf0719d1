pub mod throttle;
pub mod traits;

// API provider implementations
pub mod coingecko;
