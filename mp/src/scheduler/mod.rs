//! Batch selection and priority assignment

mod core;
mod priority;

pub use core::{eligible, select_batch, upcoming};
pub use priority::{PriorityRule, PriorityTable};
