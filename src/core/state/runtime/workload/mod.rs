pub mod workload_snapshot;
pub mod workload_snapshot_store;
