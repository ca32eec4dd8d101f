pub mod worker_controller;
