//! Linux backend: the TUNSETIFF control call and its kernel structure.
//!
//! Everything that knows the layout of `struct ifreq` or a TUN ioctl
//! number lives here. The rest of the crate only sees
//! [`create_interface`], so another platform backend can be substituted
//! behind the same contract.

use std::io;
use std::os::unix::io::RawFd;

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Maximum interface name length, including the NUL terminator.
pub(crate) const IFNAMSIZ: usize = 16;

// TUN/TAP ioctl constants
const TUNSETIFF: libc::c_ulong = 0x400454ca;

// TUN/TAP flags (from linux/if_tun.h)
/// TUN device (Layer 3).
pub(crate) const IFF_TUN: libc::c_short = 0x0001;
/// TAP device (Layer 2).
pub(crate) const IFF_TAP: libc::c_short = 0x0002;
/// Single queue.
pub(crate) const IFF_ONE_QUEUE: libc::c_short = 0x2000;

/// Width of the padding that brings [`IfReq`] up to the kernel's
/// `sizeof(struct ifreq)`: the request union is wider than the 16-bit
/// flags member used here.
const IFREQ_PAD: usize = size_of::<libc::ifreq>() - IFNAMSIZ - size_of::<libc::c_short>();

/// Interface request passed to TUNSETIFF (mirrors `struct ifreq`).
///
/// The layout is fixed: a 16-byte NUL-padded name field, the 16-bit flags
/// word, and padding to the full union width. The kernel reads the name
/// and flags and writes the resolved name back into the same structure.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct IfReq {
    name: [u8; IFNAMSIZ],
    flags: libc::c_short,
    pad: [u8; IFREQ_PAD],
}

/// Bind an open `/dev/net/tun` descriptor to a named interface.
///
/// `name` may be empty or contain a `%d` placeholder; the kernel picks
/// the final name either way and this returns what it picked. On success
/// the interface exists in the kernel's interface table; if a persistent
/// interface of that name already existed, the call attaches rather than
/// creates.
pub(crate) fn create_interface(fd: RawFd, name: &str, flags: libc::c_short) -> Result<String> {
    let bytes = name.as_bytes();
    if bytes.len() >= IFNAMSIZ {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: bytes.len(),
        });
    }
    if bytes.contains(&0) {
        return Err(Error::InvalidName(name.to_string()));
    }

    let mut ifr = IfReq::new_zeroed();
    ifr.flags = flags;
    ifr.name[..bytes.len()].copy_from_slice(bytes);

    // SAFETY: fd is an open descriptor and ifr is a full-width ifreq that
    // outlives the call.
    let ret = unsafe { libc::ioctl(fd, TUNSETIFF, &mut ifr) };
    if ret < 0 {
        return Err(Error::ioctl("TUNSETIFF", io::Error::last_os_error()));
    }

    Ok(resolved_name(&ifr.name))
}

/// Trim the fixed-width name field at its first NUL.
fn resolved_name(field: &[u8; IFNAMSIZ]) -> String {
    let len = field.iter().position(|&c| c == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).to_string()
}
