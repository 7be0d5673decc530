//! Persistent TUN device creation.

use nix::fcntl::{OFlag, open};
use nix::net::if_::if_nametoindex;
use nix::sys::stat::Mode;
use nix::unistd::close;
use std::io;
use std::os::fd::RawFd;

/// Maximum interface name length (IFNAMSIZ - 1).
pub const MAX_IF_NAME_LEN: usize = 15;

// ioctl constants for TUN/TAP
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const TUNSETPERSIST: libc::c_ulong = 0x400454cb;
const IFF_TUN: i16 = 0x0001;
const IFF_NO_PI: i16 = 0x1000;

#[repr(C)]
#[derive(Default)]
struct IfReq {
    ifr_name: [u8; 16],
    ifr_flags: i16,
    _padding: [u8; 22],
}

pub fn validate_name(name: &str) -> io::Result<()> {
    if name.is_empty() || name.len() > MAX_IF_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("interface name must be 1..={MAX_IF_NAME_LEN} bytes"),
        ));
    }
    if name.contains(['/', ' ', '\0']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name contains an invalid character",
        ));
    }
    Ok(())
}

/// Create a persistent point-to-point TUN device named `name` and return
/// its ifindex.
///
/// The device outlives the fd and has to be deleted explicitly. TUNSETIFF
/// reattaches to an existing persistent TUN of the same name, so callers
/// reject name clashes before getting here.
pub fn create_persistent_tun(name: &str) -> io::Result<u32> {
    validate_name(name)?;

    let fd = open(c"/dev/net/tun", OFlag::O_RDWR, Mode::empty()).map_err(io::Error::from)?;
    let configured = make_persistent_tun(fd, name);
    let _ = close(fd);
    configured?;

    if_nametoindex(name).map_err(io::Error::from)
}

fn make_persistent_tun(fd: RawFd, name: &str) -> io::Result<()> {
    let mut ifreq = IfReq {
        ifr_flags: IFF_TUN | IFF_NO_PI,
        ..Default::default()
    };
    ifreq.ifr_name[..name.len()].copy_from_slice(name.as_bytes());

    if unsafe { libc::ioctl(fd, TUNSETIFF as _, &mut ifreq) } < 0 {
        return Err(ioctl_error("TUNSETIFF"));
    }
    if unsafe { libc::ioctl(fd, TUNSETPERSIST as _, 1 as libc::c_int) } < 0 {
        return Err(ioctl_error("TUNSETPERSIST"));
    }
    Ok(())
}

fn ioctl_error(request: &str) -> io::Error {
    let err = io::Error::last_os_error();
    io::Error::new(err.kind(), format!("{request} failed: {err}"))
}
