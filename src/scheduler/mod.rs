pub mod controller;
mod ticker;

pub use controller::Scheduler;
