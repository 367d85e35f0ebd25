mod accumulator;
mod types;

pub use accumulator::{StreamAccumulator, TurnTranscript};
pub use types::{Fragment, StructuredCall};
