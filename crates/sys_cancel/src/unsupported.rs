use std::io::{self, Error};

use crate::CancelState;

pub const SUPPORTED: bool = false;

pub fn set_cancel_state(_state: CancelState) -> io::Result<CancelState> {
    Err(Error::new(
        io::ErrorKind::Unsupported,
        "thread cancellation is not available on this platform",
    ))
}
