mod step;
mod task;

pub use step::*;
pub use task::*;
