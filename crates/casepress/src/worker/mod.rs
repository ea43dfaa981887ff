pub mod scheduler;

pub use scheduler::{BatchScheduler, SchedulerHandle};
