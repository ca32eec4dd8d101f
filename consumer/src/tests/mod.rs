pub mod common;

pub mod event_handler;
