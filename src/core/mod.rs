pub mod classifier;
pub mod engine;
pub mod gate;
pub mod ledger;
pub mod sampler;
pub mod session;
pub mod settlement;
