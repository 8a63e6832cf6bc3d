pub mod autosave;
pub mod fixtures;
pub mod pick_store;
pub mod pool_directory;
