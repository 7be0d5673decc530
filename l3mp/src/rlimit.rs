//! Memlock limit adjustment for kernels that still charge BPF maps to RLIMIT_MEMLOCK.

use nix::sys::resource::{Resource, getrlimit, setrlimit};
use std::io;
use tracing::debug;

/// Remove the memlock limit so the classifier's maps can be pinned in memory.
pub fn raise_memlock_limit() -> io::Result<()> {
    setrlimit(
        Resource::RLIMIT_MEMLOCK,
        libc::RLIM_INFINITY,
        libc::RLIM_INFINITY,
    )
    .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    debug!("RLIMIT_MEMLOCK raised to infinity");
    Ok(())
}

/// Current (soft, hard) memlock limit.
pub fn memlock_limit() -> io::Result<(u64, u64)> {
    getrlimit(Resource::RLIMIT_MEMLOCK)
        .map(|(soft, hard)| (soft as u64, hard as u64))
        .map_err(|e| io::Error::from_raw_os_error(e as i32))
}
