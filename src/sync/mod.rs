mod coordinator;
mod error;
mod handlers;
mod sources;

pub use coordinator::{AppVisibility, HandlerStatus, ScheduledHandler, SyncCoordinator, SyncStatus};
pub use error::SyncError;
pub use handlers::{CrewSync, ElementSetSync, PositionSync, SyncHandler};
pub use sources::{CrewSource, HttpCrewSource, HttpPositionSource, PositionSource};
