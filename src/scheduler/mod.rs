//! Scheduled update engine: trigger arithmetic, persisted state, the
//! scheduler loop, and its health supervisor.

pub mod engine;
pub mod recovery;
pub mod schedule;
pub mod state;
pub mod store;
pub mod supervisor;

pub use engine::Scheduler;
pub use schedule::{FIXED_TIME_DISABLED, FixedTime, compute_next_trigger, time_until_next_trigger};
pub use state::{ScheduleState, SchedulerStatus};
pub use store::StateStore;
pub use supervisor::HealthSupervisor;
