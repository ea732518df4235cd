//! Process-level checks run before any session starts.

use super::{DeviceError, Result};

/// Refuse to run as root on Unix
pub fn check_process_policy() -> Result<()> {
    if cfg!(unix) {
        check_user(std::env::var("USER").ok().as_deref())
    } else {
        Ok(())
    }
}

pub fn check_user(user: Option<&str>) -> Result<()> {
    match user {
        Some("root") => Err(DeviceError::RootPrivilegeDisallowed),
        _ => Ok(()),
    }
}
