pub mod job;
pub mod pipeline_run;
