use std::process::ExitCode;

use pigs_link_lib::device::DeviceError;

fn main() -> ExitCode {
    match pigs_link_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let device_error = e.chain().find_map(|cause| cause.downcast_ref::<DeviceError>());
            if let Some(hint) = device_error.and_then(DeviceError::remediation) {
                eprintln!("hint: {}", hint);
            }
            if device_error.is_some_and(DeviceError::is_fatal) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
