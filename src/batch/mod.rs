pub mod executor;
pub mod outcome;
pub mod splitter;

mod governor;

pub use executor::*;
pub use outcome::{BatchOutcome, PanicPayload, RunOutcome};
pub use splitter::{Batch, Batches};
