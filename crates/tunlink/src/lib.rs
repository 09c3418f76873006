//! TUN/TAP packet I/O library.
//!
//! This crate creates (or attaches to) TUN and TAP virtual network
//! interfaces on Linux and exchanges packets with the kernel as discrete
//! framed units rather than a raw byte stream. TUN devices carry Layer 3
//! (IP) packets; TAP devices carry full Layer 2 (Ethernet) frames,
//! broadcast and multicast included.
//!
//! Note that while this crate lets you create the interface and pass
//! packets to and from it, it does not configure the interface. Assigning
//! addresses, bringing the link up, MTU and routing are a large topic of
//! their own and are handled separately (netlink, iproute2).
//!
//! # Example
//!
//! ```ignore
//! use tunlink::{Mode, TunTap};
//!
//! // "%d" lets the kernel pick the final name (tun0, tun1, ...).
//! let mut tun = TunTap::open("tun%d", Mode::Tun)?;
//! println!("listening on {}", tun.name());
//!
//! loop {
//!     let packet = tun.read_packet()?;
//!     println!("{:04x} {} bytes", packet.protocol, packet.payload.len());
//! }
//! ```
//!
//! # Async Support
//!
//! Enable the `async` feature for the channel-based interface: the device
//! descriptor is serviced by two background tasks and packets flow through
//! bounded in-process channels.
//!
//! ```ignore
//! use tunlink::{Mode, TunTap};
//!
//! let mut tun = TunTap::builder()
//!     .name("tun%d")
//!     .mode(Mode::Tun)
//!     .create_async()
//!     .await?;
//!
//! while let Some(packet) = tun.recv().await {
//!     println!("{:04x} {} bytes", packet.protocol, packet.payload.len());
//! }
//! tun.close().await?;
//! ```

mod device;
mod error;
pub mod frame;

// Platform backend: everything that knows the kernel's control-call layout.
// A port to another OS supplies its own module behind the same interface.
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux as platform;

#[cfg(feature = "async")]
mod channel;

pub use device::{Mode, TunTap, TunTapBuilder, TunTapFlags};
pub use error::{Error, Result};
pub use frame::{MAX_FRAME, Packet, TUN_PKT_STRIP};

#[cfg(feature = "async")]
pub use channel::AsyncTunTap;

/// The path to the TUN control device.
pub const TUN_DEVICE_PATH: &str = "/dev/net/tun";
