pub mod calendar;
pub mod duration;
pub mod ids;
pub mod priority;
pub mod skill;

pub use calendar::{contained_in_windows, earliest_fit, BusinessCalendar, LunchWindow, ShiftHours};
pub use duration::Duration;
pub use ids::{
    AssignmentId, JobId, MachineId, OperationId, OperatorId, ScheduleId, TaskId, ZoneId,
};
pub use priority::JobPriority;
pub use skill::{Skill, SkillRequirement, MAX_SKILL_LEVEL, MIN_SKILL_LEVEL};
