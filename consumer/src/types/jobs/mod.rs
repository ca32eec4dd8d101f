pub mod change_event;
pub mod job_item;
pub mod job_updates;
pub mod types;
