//! Live status feed: interprets lines the gun sends while no request is in flight.

pub mod reader;
pub mod types;

pub use reader::{parse_status_line, parse_telemetry_line, spawn_status_feed, FeedHandle, StatusLine};
pub use types::{FeedMode, Point, StatusEvent, TestPoints};
