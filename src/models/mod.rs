pub mod credit;
pub mod job;
pub mod scenario;
pub mod tryon;
