//! Task queue, deadline timers and the single-task scheduler.

pub mod clock;
pub mod current;
pub mod outcome;
pub mod persist;
pub mod queue;
pub mod scheduler;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use current::CurrentTask;
pub use outcome::{RunOutcome, ScheduleInfo};
pub use persist::StoreError;
pub use queue::TaskQueue;
pub use scheduler::{Scheduler, TaskDispatcher};
pub use timer::{Timer, TimerManager};
pub use types::{Task, TaskType, status};
