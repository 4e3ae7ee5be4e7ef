pub mod daemon;
pub mod notify;
pub mod stats;
pub mod tasks;
pub mod timer;
