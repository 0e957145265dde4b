//! Best-effort CPU pinning for workers.
//!
//! Pinning failures are recorded and reported, never fatal: asking for more
//! CPUs than the host has (e.g. 16 readers at stride 2 on an 8-way box) must
//! still produce a measurement.

/// Result of a pinning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// No pinning was requested for this worker.
    Unpinned,
    Pinned { cpu: usize },
    Failed { cpu: usize, errno: i32 },
}

/// Pin the calling thread to `cpu`.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) -> PinOutcome {
    // CPU_SET indexes a fixed-width mask; anything beyond it cannot be set.
    if cpu >= libc::CPU_SETSIZE as usize {
        return PinOutcome::Failed {
            cpu,
            errno: libc::EINVAL,
        };
    }
    // SAFETY: `set` is a plain bitmask owned by this frame; the size passed
    // to sched_setaffinity matches its type. pid 0 targets the calling thread.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc == 0 {
        PinOutcome::Pinned { cpu }
    } else {
        let errno = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EINVAL);
        PinOutcome::Failed { cpu, errno }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(cpu: usize) -> PinOutcome {
    PinOutcome::Failed {
        cpu,
        errno: libc::ENOSYS,
    }
}
