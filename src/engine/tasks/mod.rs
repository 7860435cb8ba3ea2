mod full_sync;
mod incremental_sync;

pub use full_sync::run_full_sync;
pub use incremental_sync::run_incremental_sync;
