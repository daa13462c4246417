// visitlog state managers
// Managers own mutable state behind their own locks.

pub mod history_store;
