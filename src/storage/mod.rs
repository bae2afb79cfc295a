pub mod memory;
pub mod sql;
pub mod traits;
