mod cron;
mod model;
mod status;

pub use cron::{CronParseError, CronSchedule};
pub use model::{
    Schedule, DEFAULT_CHECK_WARNING_SECONDS, LAST_EXECUTION_KEY, SCHEDULE_NAME_KEY,
};
pub use status::ScheduleStatus;
