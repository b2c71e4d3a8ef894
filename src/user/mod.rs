pub mod activity;
pub mod profile;

pub use activity::{
    apply_daily_activity, calendar_day, evaluate_daily_activity, ActivityConfig, ActivityOutcome,
};
pub use profile::{User, ANONYMOUS};
