pub mod collect;
pub mod export;
pub mod ingest;
pub mod plan;
pub mod sweep;
pub mod watch;
