//! Checkpointed, resumable stage processing over the annotated store.

mod processor;
mod suppress;

pub use processor::{StageProcessor, StageReport};
pub use suppress::apply_suppression;
