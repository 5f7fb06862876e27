pub mod error;
pub mod maintenance;
pub mod positions;
pub mod predict;
pub mod sync;
