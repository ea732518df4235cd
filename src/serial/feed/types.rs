//! Live status feed event types
use serde::{Deserialize, Serialize};

use crate::config::Calibration;

/// What the feed interprets incoming lines as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeedMode {
    Status = 0,
    Telemetry = 1,
}

impl From<u8> for FeedMode {
    fn from(value: u8) -> Self {
        if value == FeedMode::Telemetry as u8 {
            FeedMode::Telemetry
        } else {
            FeedMode::Status
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// One IR camera frame reported in test mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPoints {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
    pub median: Point,
    pub aim: Point,
}

impl TestPoints {
    /// Closed outline through the four corner points
    pub fn outline(&self) -> [Point; 5] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left, self.top_left]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusEvent {
    ButtonPressed { button: u8 },
    ButtonReleased { button: u8 },
    ProfileChanged { profile: u8 },
    ProfileUpdated { profile: u8, calibration: Calibration },
    Telemetry(TestPoints),
    ProtocolNotice { message: String },
    Unclassified { line: String },
}
