use std::io::{self, Error};

use crate::CancelState;

pub const SUPPORTED: bool = true;

// The `libc` crate does not bind the cancellation API, so the values are
// spelled out per libc flavour.
#[cfg(target_vendor = "apple")]
mod consts {
    pub const PTHREAD_CANCEL_ENABLE: libc::c_int = 0x01;
    pub const PTHREAD_CANCEL_DISABLE: libc::c_int = 0x00;
}

#[cfg(not(target_vendor = "apple"))]
mod consts {
    pub const PTHREAD_CANCEL_ENABLE: libc::c_int = 0;
    pub const PTHREAD_CANCEL_DISABLE: libc::c_int = 1;
}

use consts::{PTHREAD_CANCEL_DISABLE, PTHREAD_CANCEL_ENABLE};

extern "C" {
    fn pthread_setcancelstate(state: libc::c_int, oldstate: *mut libc::c_int) -> libc::c_int;
}

const fn to_raw(state: CancelState) -> libc::c_int {
    match state {
        CancelState::Enabled => PTHREAD_CANCEL_ENABLE,
        CancelState::Disabled => PTHREAD_CANCEL_DISABLE,
    }
}

fn from_raw(raw: libc::c_int) -> io::Result<CancelState> {
    match raw {
        PTHREAD_CANCEL_ENABLE => Ok(CancelState::Enabled),
        PTHREAD_CANCEL_DISABLE => Ok(CancelState::Disabled),
        other => Err(Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown pthread cancel state {other}"),
        )),
    }
}

pub fn set_cancel_state(state: CancelState) -> io::Result<CancelState> {
    let mut old: libc::c_int = PTHREAD_CANCEL_ENABLE;

    // SAFETY: `old` is a valid, writable c_int for the duration of the call.
    let rc = unsafe { pthread_setcancelstate(to_raw(state), &mut old) };
    if rc != 0 {
        // pthread functions return the error number instead of setting errno.
        return Err(Error::from_raw_os_error(rc));
    }

    from_raw(old)
}
