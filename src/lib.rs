//! A catastrophe-reinsurance Monte-Carlo aggregation engine: parallel
//! delimited-text ingestion, a simulation algebra of events/years/
//! simulations, and a TVaR allocation engine.

pub mod block_reader;
pub mod error;
pub mod event;
pub mod ingest;
pub mod loss_series;
pub mod parser;
pub mod simulation;
pub mod types;
pub mod year;

pub use error::EngineError;
pub use event::Event;
pub use ingest::{ingest_file, IngestOptions};
pub use loss_series::LossSeries;
pub use simulation::Simulation;
pub use year::Year;
