pub mod engine;
pub mod feedback;
pub mod indicators;
pub mod ledger;
pub mod phase;
pub mod pipeline;
pub mod profit;
pub mod risk;
pub mod shutdown;
