// ABOUTME: Binlog client boundary: positions, notifications and the handler contract
// ABOUTME: Ships a JSON-lines replay feed that drives any EventHandler

pub mod handler;
pub mod notification;
pub mod position;
pub mod replay;
pub mod value;

pub use handler::{dispatch, EventHandler};
pub use notification::{Notification, RowAction, RowsNotification};
pub use position::Position;
pub use replay::{ReplayFeed, ReplayStats};
pub use value::ColumnValue;
