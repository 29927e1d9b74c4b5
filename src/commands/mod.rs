pub mod extract;
pub mod import;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod run_manifest;
pub mod status;
