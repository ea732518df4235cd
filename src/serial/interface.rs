use async_trait::async_trait;
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;
use tokio::time::Instant;

use super::{LineTransport, Result, SerialDeviceInfo, SerialError};
use crate::config::KnownDevice;

/// Poll interval while waiting for bytes
const READ_POLL_MS: u64 = 10;

pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
    device_info: Option<SerialDeviceInfo>,
    pending: String,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self {
            port: None,
            device_info: None,
            pending: String::new(),
        }
    }

    /// Discover light guns matching the known-device table
    pub fn discover_devices(known: &[KnownDevice]) -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();

        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                let Some(known) = known.iter().find(|k| k.vid == usb_info.vid && k.pid == usb_info.pid) else {
                    continue;
                };
                devices.push(SerialDeviceInfo {
                    port_name: port.port_name.clone(),
                    vid: usb_info.vid,
                    pid: usb_info.pid,
                    serial_number: usb_info.serial_number.clone(),
                    manufacturer: usb_info.manufacturer.clone(),
                    product: usb_info.product.clone(),
                    display_name: Some(known.name.clone()),
                });
            }
        }

        log::debug!("Discovered {} light gun(s)", devices.len());
        Ok(devices)
    }

    /// Open `port_name` with DTR asserted
    pub fn connect(&mut self, info: &SerialDeviceInfo, baud_rate: u32) -> Result<()> {
        let port_name = info.port_name.as_str();
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(READ_POLL_MS))
            .open()
            .map_err(|e| open_error(port_name, e))?;

        // The firmware only talks once DTR is up.
        if let Err(e) = port.write_data_terminal_ready(true) {
            log::warn!("Failed to assert DTR on {}: {}", port_name, e);
        }

        self.port = Some(port);
        self.device_info = Some(info.clone());
        self.pending.clear();

        log::info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(())
    }

    /// Get current device info
    pub fn device_info(&self) -> Option<&SerialDeviceInfo> {
        self.device_info.as_ref()
    }

    fn take_line(&mut self) -> Option<String> {
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }
}

fn open_error(port_name: &str, e: serialport::Error) -> SerialError {
    match e.kind() {
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            SerialError::PermissionDenied(port_name.to_string())
        }
        serialport::ErrorKind::NoDevice => SerialError::PortNotFound(port_name.to_string()),
        _ => SerialError::ConnectionFailed(format!("{}: {}", port_name, e)),
    }
}

fn write_error(line: &str, e: std::io::Error) -> SerialError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            SerialError::Timeout(format!("write of {}", line))
        }
        _ => SerialError::IoError(e),
    }
}

#[async_trait]
impl LineTransport for SerialInterface {
    async fn write_line(&mut self, line: &str, timeout_ms: u64) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        log::trace!("-> {}", line);

        // Reads poll with a short timeout; writes get the full deadline.
        port.set_timeout(Duration::from_millis(timeout_ms))?;
        let written = port
            .write_all(format!("{}\n", line).as_bytes())
            .and_then(|_| port.flush());
        let restored = port.set_timeout(Duration::from_millis(READ_POLL_MS));

        written.map_err(|e| write_error(line, e))?;
        restored?;
        Ok(())
    }

    async fn read_line(&mut self, timeout_ms: u64) -> Result<Option<String>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut buffer = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                log::trace!("<- {}", line);
                return Ok(Some(line));
            }

            let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
            match port.bytes_to_read()? {
                0 => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep(Duration::from_millis(READ_POLL_MS)).await;
                }
                _ => match port.read(&mut buffer) {
                    Ok(n) => self.pending.push_str(&String::from_utf8_lossy(&buffer[..n])),
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => return Err(SerialError::IoError(e)),
                },
            }
        }
    }

    fn close(&mut self) {
        if let Some(device) = &self.device_info {
            log::info!("Closing {}", device.port_name);
        }
        self.port = None;
        self.device_info = None;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_buffered_lines_and_skips_blanks() {
        let mut iface = SerialInterface::new();
        iface.pending.push_str("OK: one\r\n\r\n  -127 \npartial");
        assert_eq!(iface.take_line().as_deref(), Some("OK: one"));
        assert_eq!(iface.take_line().as_deref(), Some("-127"));
        assert_eq!(iface.take_line(), None);
        assert_eq!(iface.pending, "partial");
    }

    #[test]
    fn stalled_write_is_a_timeout() {
        let stalled = std::io::Error::new(std::io::ErrorKind::TimedOut, "stalled");
        assert!(matches!(write_error("XS", stalled), SerialError::Timeout(what) if what == "write of XS"));

        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(write_error("XS", broken), SerialError::IoError(_)));
    }

    #[tokio::test]
    async fn closed_interface_reports_not_connected() {
        let mut iface = SerialInterface::new();
        assert!(!iface.is_open());
        assert!(matches!(iface.write_line("XP", 100).await, Err(SerialError::NotConnected)));
    }
}
