//! Database repository layer

pub mod activity_repo;
pub mod memory;
pub mod session_repo;

pub use activity_repo::*;
pub use memory::*;
pub use session_repo::*;
