//! Error types for TUN/TAP operations.

use std::io;

/// Result type for TUN/TAP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during TUN/TAP operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The control device could not be opened (missing module, missing
    /// privilege, or no /dev/net/tun at all).
    #[error("cannot open {path}: {source}")]
    DeviceUnavailable {
        /// The control device path.
        path: &'static str,
        /// The underlying error.
        source: io::Error,
    },

    /// ioctl failed.
    #[error("ioctl {name} failed: {source}")]
    Ioctl {
        /// The ioctl name.
        name: &'static str,
        /// The underlying error.
        source: io::Error,
    },

    /// Device name too long (max 15 characters).
    #[error("device name too long: {name} ({len} > 15 characters)")]
    NameTooLong {
        /// The name that was too long.
        name: String,
        /// The length of the name.
        len: usize,
    },

    /// Invalid device name.
    #[error("invalid device name: {0}")]
    InvalidName(String),

    /// No mode specified (must be TUN or TAP).
    #[error("no mode specified (must be tun or tap)")]
    NoModeSpecified,

    /// Frame shorter than the packet-information header.
    #[error("malformed frame: {len} bytes, need at least 4")]
    MalformedFrame {
        /// Length of the offending frame.
        len: usize,
    },

    /// Read from the device failed.
    #[error("device read failed: {0}")]
    Read(#[source] io::Error),

    /// Write to the device failed.
    #[error("device write failed: {0}")]
    Write(#[source] io::Error),

    /// Write completed but covered only part of the frame. The device
    /// consumes one packet per write, so a partial frame is fatal to the
    /// write path, not a condition to retry.
    #[error("short write: {written} of {len} bytes")]
    ShortWrite {
        /// Bytes the write call reported.
        written: usize,
        /// Length of the full frame.
        len: usize,
    },

    /// The device has been closed.
    #[error("device closed")]
    Closed,
}

impl Error {
    /// Create an ioctl error.
    pub fn ioctl(name: &'static str, source: io::Error) -> Self {
        Error::Ioctl { name, source }
    }
}
