// This is free and unencumbered software released into the public domain.

//! CLI helpers (error reporting, verbosity handling).
//!
//! This module must compile even when the crate feature `cli` is disabled.

#[cfg(feature = "cli")]
use crate::shared::CameraError;

#[cfg(feature = "cli")]
use asimov_module::SysexitsError::{self, *};

#[cfg(feature = "cli")]
use clientele::StandardOptions;

#[cfg(feature = "cli")]
pub fn handle_error(err: &CameraError, flags: &StandardOptions) -> SysexitsError {
    tracing::error!(target: "asimov_camera2_module", %err, category = %err.category(), "camera command failed");
    if flags.debug || flags.verbose >= 2 {
        tracing::debug!(target: "asimov_camera2_module", ?err, "detailed error");
    }

    report_error(err, flags);
    map_error_to_sysexit(err)
}

#[cfg(feature = "cli")]
pub fn info_user(flags: &StandardOptions, msg: &str) {
    if flags.debug || flags.verbose >= 1 {
        eprintln!("INFO: {msg}");
    }
    tracing::info!(target: "asimov_camera2_module", "{msg}");
}

#[cfg(feature = "cli")]
pub fn warn_user(flags: &StandardOptions, msg: &str) {
    if flags.debug || flags.verbose >= 1 {
        eprintln!("WARN: {msg}");
    }
    tracing::warn!(target: "asimov_camera2_module", "{msg}");
}

#[cfg(feature = "cli")]
pub fn warn_user_with_error(flags: &StandardOptions, msg: &str, error: &dyn std::error::Error) {
    if flags.debug || flags.verbose >= 2 {
        eprintln!("WARN: {msg}: {error}");
    } else if flags.verbose >= 1 {
        eprintln!("WARN: {msg}");
    }
    tracing::warn!(target: "asimov_camera2_module", error = %error, "{msg}");
}

#[cfg(feature = "cli")]
fn report_error(err: &CameraError, flags: &StandardOptions) {
    use std::error::Error as _;
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "ERROR: {err}");

    if flags.debug || flags.verbose >= 2 {
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = writeln!(stderr, "  Caused by: {}", cause);
            source = cause.source();
        }
    }
}

#[cfg(feature = "cli")]
pub fn map_error_to_sysexit(err: &CameraError) -> SysexitsError {
    match err {
        CameraError::NoDriver => EX_UNAVAILABLE,
        CameraError::NoCamera => EX_USAGE,
        CameraError::NotConfigured | CameraError::NotStarted => EX_CONFIG,
        CameraError::InvalidConfig(_) => EX_USAGE,
        CameraError::Unsupported(_)
        | CameraError::NoSupportedSize
        | CameraError::NoSupportedFramerate => EX_UNAVAILABLE,
        CameraError::Busy(_) | CameraError::PhotoPending | CameraError::Access(_) => EX_TEMPFAIL,
        CameraError::Disconnected | CameraError::Closed => EX_IOERR,
        CameraError::Configuration(_) | CameraError::Protocol(_) => EX_PROTOCOL,
        CameraError::DriverError { .. } => EX_SOFTWARE,
        CameraError::Other(_) => EX_SOFTWARE,
    }
}

// When `cli` is disabled, keep the module linkable without exposing CLI-only types.
#[cfg(not(feature = "cli"))]
#[inline]
pub fn info_user(_msg: &str) {}

#[cfg(not(feature = "cli"))]
#[inline]
pub fn warn_user(_msg: &str) {}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;
    use crate::shared::CameraState;

    #[test]
    fn errors_map_to_sysexits() {
        assert!(matches!(map_error_to_sysexit(&CameraError::NoDriver), EX_UNAVAILABLE));
        assert!(matches!(map_error_to_sysexit(&CameraError::NoCamera), EX_USAGE));
        assert!(matches!(
            map_error_to_sysexit(&CameraError::Busy(CameraState::Opening)),
            EX_TEMPFAIL
        ));
        assert!(matches!(map_error_to_sysexit(&CameraError::Disconnected), EX_IOERR));
        assert!(matches!(
            map_error_to_sysexit(&CameraError::protocol("planes")),
            EX_PROTOCOL
        ));
    }
}
