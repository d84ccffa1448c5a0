pub mod scheduler;
pub mod system;
