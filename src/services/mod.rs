// visitlog services
// Persistence backends, the save scheduler, and the host primitives it runs on.

pub mod clock;
pub mod executor;
pub mod history_persistence;
pub mod save_scheduler;
