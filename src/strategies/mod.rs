pub mod scalper;
pub mod traits;
