pub mod feedback;
pub mod job;
pub mod submission;
