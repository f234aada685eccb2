// This is free and unencumbered software released into the public domain.

use crate::shared::CameraState;
use derive_more::Display;
use std::error::Error as StdError;
use thiserror::Error;

/// Coarse classification of a [`CameraError`], used to decide how far a
/// failure propagates.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Device busy, permission/security failure, or illegal argument.
    #[display("access")]
    Access,
    /// A capture session failed to configure.
    #[display("configuration")]
    Configuration,
    /// A delivered image violated the negotiated format contract.
    #[display("protocol")]
    Protocol,
    /// The device was removed or revoked externally.
    #[display("disconnect")]
    Disconnect,
    /// The caller asked for something the engine cannot do right now.
    #[display("usage")]
    Usage,
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no suitable camera backend available")]
    NoDriver,

    #[error("no camera device available")]
    NoCamera,

    #[error("no capture format allocated")]
    NotConfigured,

    #[error("capture is not started")]
    NotStarted,

    #[error("camera is busy ({0})")]
    Busy(CameraState),

    #[error("a photo capture is already pending")]
    PhotoPending,

    #[error("no supported resolutions")]
    NoSupportedSize,

    #[error("no supported framerate ranges")]
    NoSupportedFramerate,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("camera access error: {0}")]
    Access(String),

    #[error("capture session configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Protocol(String),

    #[error("camera device disconnected")]
    Disconnected,

    #[error("stream closed")]
    Closed,

    #[error("driver error while {context}")]
    DriverError {
        context: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{0}")]
    Other(String),
}

impl CameraError {
    #[inline]
    pub fn driver(context: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::DriverError {
            context,
            source: Box::new(source),
        }
    }

    #[inline]
    pub fn access(msg: impl Into<String>) -> Self {
        Self::Access(msg.into())
    }

    #[inline]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    #[inline]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    #[inline]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    #[inline]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Access(_) | Self::DriverError { .. } | Self::Closed => ErrorCategory::Access,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Disconnected => ErrorCategory::Disconnect,
            _ => ErrorCategory::Usage,
        }
    }
}
