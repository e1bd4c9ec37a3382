//SPDX-License-Identifier: MPL-2.0

/*!
The single failure channel used by every layer of the shell.

Each variant carries a stable 32-bit failure code.  Codes are what crosses the
scripting boundary (a rejected promise receives exactly one numeric argument)
and what the process returns when startup fails.
*/

const fn code(value: u32) -> i32 {
    value as i32
}

/// Generic failure.
pub const E_FAIL: i32 = code(0x8000_4005);
/// Operation aborted.
pub const E_ABORT: i32 = code(0x8000_4004);
/// Invalid argument.
pub const E_INVALIDARG: i32 = code(0x8007_0057);
/// Catastrophic or unexpected failure.
pub const E_UNEXPECTED: i32 = code(0x8000_FFFF);
/// Not enough resources to complete the operation.
pub const E_OUTOFMEMORY: i32 = code(0x8007_000E);
/// The network is not available.
pub const E_NETWORK_NOT_AVAILABLE: i32 = code(0x8007_04C6);
/// Element not found.
pub const E_NOT_FOUND: i32 = code(0x8007_0490);
/// The object is not in a state that allows the operation.
pub const E_NOT_VALID_STATE: i32 = code(0x8007_139F);
/// Field name not found.
pub const E_FIELD_NOT_FOUND: i32 = code(0x8002_8017);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("the network is not available")]
    NetworkUnavailable,
    #[error("not found")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation aborted")]
    Aborted,
    #[error("achievement stats have not been received yet")]
    NotReady,
    #[error("unknown field {0}")]
    FieldNotFound(String),
    #[error("operation failed: {0}")]
    Failed(String),
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("worker thread exited abnormally: {0}")]
    WorkerExited(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Error::Failed(message.into())
    }

    /**
    The numeric failure code reported to script when a promise is rejected.
    */
    pub fn code(&self) -> i32 {
        match self {
            Error::NetworkUnavailable => E_NETWORK_NOT_AVAILABLE,
            Error::NotFound => E_NOT_FOUND,
            Error::InvalidArgument(_) => E_INVALIDARG,
            Error::Aborted => E_ABORT,
            Error::NotReady => E_NOT_VALID_STATE,
            Error::FieldNotFound(_) => E_FIELD_NOT_FOUND,
            Error::Failed(_) => E_FAIL,
            Error::ResourceExhausted(_) => E_OUTOFMEMORY,
            Error::WorkerExited(_) => E_UNEXPECTED,
            Error::Io(e) => match e.raw_os_error() {
                Some(os) if os > 0 => code(0x8007_0000 | (os as u32 & 0xFFFF)),
                _ => E_FAIL,
            },
        }
    }

    /**
    The process exit code for a fatal error.  Zero is reserved for a clean shutdown,
    and every failure code is negative, so the two never collide.
    */
    pub fn exit_code(&self) -> i32 {
        self.code()
    }

    /// Converts a caught panic payload into a failure.
    pub(crate) fn from_panic(context: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Error::Failed(format!("{context} panicked: {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_platform_values() {
        assert_eq!(Error::NetworkUnavailable.code() as u32, 0x8007_04C6);
        assert_eq!(Error::NotFound.code() as u32, 0x8007_0490);
        assert_eq!(Error::invalid_argument("x").code() as u32, 0x8007_0057);
        assert_eq!(Error::Aborted.code() as u32, 0x8000_4004);
        assert_eq!(Error::failed("x").code() as u32, 0x8000_4005);
    }

    #[test]
    fn io_errors_carry_os_code() {
        let e = Error::from(std::io::Error::from_raw_os_error(2));
        assert_eq!(e.code() as u32, 0x8007_0002);
        let e = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(e.code(), E_FAIL);
    }

    #[test]
    fn exit_codes_are_never_success() {
        assert_ne!(Error::WorkerExited("x".into()).exit_code(), 0);
        assert!(Error::ResourceExhausted("x".into()).exit_code() < 0);
    }

    #[test]
    fn panic_payloads_become_failures() {
        let payload = std::panic::catch_unwind(|| panic!("bad translate")).unwrap_err();
        let e = Error::from_panic("translate", payload);
        assert!(matches!(e, Error::Failed(ref m) if m.contains("bad translate")));
    }
}
