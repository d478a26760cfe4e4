pub mod job;
pub mod machine;
pub mod operator;
pub mod production_zone;
pub mod schedule;
pub mod task;

pub use job::{Job, JobStatus, MAX_TASKS_PER_JOB};
pub use machine::{AutomationLevel, Machine, MachineStatus};
pub use operator::{Operator, OperatorStatus};
pub use production_zone::ProductionZone;
pub use schedule::{Schedule, ScheduleAssignment, ScheduleMetrics, ScheduleStatus};
pub use task::{AssignmentType, OperatorAssignment, Task, TaskStatus, MAX_REWORK_COUNT};
