//! Device creation and the blocking packet interface.

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};

use crate::TUN_DEVICE_PATH;
use crate::error::{Error, Result};
use crate::frame::{self, MAX_FRAME, Packet};
use crate::platform;

/// Device mode (TUN or TAP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// TUN device - operates at Layer 3 (IP packets).
    Tun,
    /// TAP device - operates at Layer 2 (Ethernet frames).
    Tap,
}

impl Mode {
    /// Get the ifreq flag for this mode.
    fn flag(&self) -> libc::c_short {
        match self {
            Mode::Tun => platform::IFF_TUN,
            Mode::Tap => platform::IFF_TAP,
        }
    }

    /// Get the mode name.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Tun => "tun",
            Mode::Tap => "tap",
        }
    }
}

/// Additional flags for TUN/TAP devices.
///
/// The packet-information header is never optional here: the framing
/// layer depends on it, so `IFF_NO_PI` is deliberately not exposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunTapFlags {
    /// Use single queue (for backwards compatibility).
    pub one_queue: bool,
}

impl TunTapFlags {
    /// Convert to ifreq flags.
    fn as_flags(&self) -> libc::c_short {
        let mut flags: libc::c_short = 0;
        if self.one_queue {
            flags |= platform::IFF_ONE_QUEUE;
        }
        flags
    }
}

/// Builder for opening TUN/TAP devices.
#[derive(Debug, Clone)]
pub struct TunTapBuilder {
    name: Option<String>,
    mode: Option<Mode>,
    flags: TunTapFlags,
}

impl TunTapBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            name: None,
            mode: None,
            flags: TunTapFlags::default(),
        }
    }

    /// Set the device name.
    ///
    /// May contain a `%d` placeholder (`"tun%d"`); if not specified at
    /// all, the kernel assigns a name (tun0, tap0, ...). The name the
    /// kernel settled on is available from the handle afterwards.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the device mode (TUN or TAP).
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Use single queue (for backwards compatibility).
    pub fn one_queue(mut self, value: bool) -> Self {
        self.flags.one_queue = value;
        self
    }

    /// Open the device and return the blocking handle.
    pub fn create(self) -> Result<TunTap> {
        let (file, name, mode) = self.open_device()?;
        Ok(TunTap {
            file,
            name,
            mode,
            scratch: vec![0u8; MAX_FRAME],
        })
    }

    /// Open the device and start the channel-based packet pumps.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(feature = "async")]
    pub async fn create_async(self) -> Result<crate::channel::AsyncTunTap> {
        let (file, name, mode) = self.open_device()?;
        crate::channel::AsyncTunTap::start(file, name, mode)
    }

    /// Open the control device and bind it to the requested interface.
    fn open_device(self) -> Result<(File, String, Mode)> {
        let mode = self.mode.ok_or(Error::NoModeSpecified)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_DEVICE_PATH)
            .map_err(|source| Error::DeviceUnavailable {
                path: TUN_DEVICE_PATH,
                source,
            })?;

        let flags = mode.flag() | self.flags.as_flags();
        // On failure `file` drops here, releasing the control device.
        let name = platform::create_interface(
            file.as_raw_fd(),
            self.name.as_deref().unwrap_or(""),
            flags,
        )?;

        tracing::debug!(name = %name, mode = mode.name(), "opened tun/tap device");
        Ok((file, name, mode))
    }
}

impl Default for TunTapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A TUN/TAP device with blocking packet I/O.
///
/// The handle exclusively owns the device descriptor; dropping it (or
/// calling [`close`](TunTap::close)) is the only way the descriptor is
/// released.
pub struct TunTap {
    file: File,
    name: String,
    mode: Mode,
    scratch: Vec<u8>,
}

impl TunTap {
    /// Create a new builder.
    pub fn builder() -> TunTapBuilder {
        TunTapBuilder::new()
    }

    /// Open a device in one call.
    ///
    /// Equivalent to `TunTap::builder().name(pattern).mode(mode).create()`.
    pub fn open(pattern: &str, mode: Mode) -> Result<Self> {
        TunTapBuilder::new().name(pattern).mode(mode).create()
    }

    /// Get the device name the kernel resolved.
    ///
    /// This can differ from the requested pattern: `"tun%d"` comes back
    /// as `"tun0"`, `"tun1"`, ...
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Read one packet, blocking until the kernel delivers a frame.
    ///
    /// One read call per packet; a failed read is surfaced as-is and
    /// never retried here. A frame shorter than the packet-information
    /// header yields [`Error::MalformedFrame`] and leaves the device
    /// usable for the next read.
    pub fn read_packet(&mut self) -> Result<Packet> {
        frame::read_frame(&mut (&self.file), &mut self.scratch)
    }

    /// Write one packet as a single frame.
    ///
    /// The kernel requires the whole frame in one write call, so a short
    /// count is reported as [`Error::ShortWrite`] rather than retried.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        frame::write_frame(&mut (&self.file), packet)
    }

    /// Close the device, releasing the descriptor.
    ///
    /// Consuming `self` makes a second close unrepresentable; dropping
    /// the handle has the same effect.
    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }

    /// Take ownership of the underlying file.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl AsRawFd for TunTap {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl IntoRawFd for TunTap {
    fn into_raw_fd(self) -> RawFd {
        self.file.into_raw_fd()
    }
}
