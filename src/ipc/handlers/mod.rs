pub mod core;
pub mod ingest;
pub mod setup;
pub mod students;
pub mod taxonomy;
