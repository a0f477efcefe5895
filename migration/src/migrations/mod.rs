pub mod m202608310001_create_submissions;
pub mod m202608310002_create_feedback_reports;
pub mod m202608310003_create_jobs;
