//! Best-effort CPU affinity and thread naming.
//!
//! Platform dispatch is split along the unix/windows line via `cfg-if`.

use crate::util::parallelism::known_parallelism;

/// Pins the calling thread to core `index mod hardware_concurrency` and
/// assigns it `name`, logging a warning on failure rather than propagating
/// one. Affinity and naming are best-effort: a platform that refuses either
/// is not a hard failure.
pub(super) fn pin_and_name(index: usize, name: &str) {
    let core = index % known_parallelism().get();
    if let Err(err) = set_affinity(core) {
        log::warn!("failed to set CPU affinity for thread `{name}` to core {core}: {err}");
    }
    if let Err(err) = set_name(name) {
        log::warn!("failed to set name for thread `{name}`: {err}");
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn set_affinity(core: usize) -> Result<(), std::io::Error> {
            unsafe {
                let mut set: libc::cpu_set_t = std::mem::zeroed();
                libc::CPU_ZERO(&mut set);
                libc::CPU_SET(core, &mut set);
                let result = libc::pthread_setaffinity_np(
                    libc::pthread_self(),
                    std::mem::size_of::<libc::cpu_set_t>(),
                    &set,
                );
                if result == 0 {
                    Ok(())
                } else {
                    Err(std::io::Error::from_raw_os_error(result))
                }
            }
        }

        fn set_name(name: &str) -> Result<(), std::io::Error> {
            // `pthread_setname_np` on Linux caps names at 16 bytes including
            // the terminator; truncate rather than fail.
            let mut truncated = name.as_bytes();
            if truncated.len() > 15 {
                truncated = &truncated[..15];
            }
            let c_name = std::ffi::CString::new(truncated).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "thread name contains a NUL byte")
            })?;
            let result = unsafe { libc::pthread_setname_np(libc::pthread_self(), c_name.as_ptr()) };
            if result == 0 {
                Ok(())
            } else {
                Err(std::io::Error::from_raw_os_error(result))
            }
        }
    } else if #[cfg(target_os = "macos")] {
        fn set_affinity(_core: usize) -> Result<(), std::io::Error> {
            // Affinity pinning is Linux-specific in this crate; macOS has no
            // equivalent in `libc`'s portable surface.
            Ok(())
        }

        fn set_name(name: &str) -> Result<(), std::io::Error> {
            // macOS's `pthread_setname_np` only names the calling thread and
            // takes a single argument, unlike Linux's two-argument form.
            let c_name = std::ffi::CString::new(name).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "thread name contains a NUL byte")
            })?;
            let result = unsafe { libc::pthread_setname_np(c_name.as_ptr()) };
            if result == 0 {
                Ok(())
            } else {
                Err(std::io::Error::from_raw_os_error(result))
            }
        }
    } else if #[cfg(unix)] {
        fn set_affinity(_core: usize) -> Result<(), std::io::Error> {
            // Other unix targets (the BSDs) have no `pthread_setname_np`
            // signature this crate can call portably through `libc` (it
            // varies: FreeBSD's `pthread_set_name_np` returns `void` and
            // takes no length limit, NetBSD's takes a format string). Both
            // affinity and naming are no-ops here rather than a guess that
            // fails to compile on some target in this family.
            Ok(())
        }

        fn set_name(_name: &str) -> Result<(), std::io::Error> {
            Ok(())
        }
    } else if #[cfg(windows)] {
        fn set_affinity(core: usize) -> Result<(), std::io::Error> {
            use winapi::um::processthreadsapi::{GetCurrentThread, SetThreadAffinityMask};

            let mask: winapi::shared::basetsd::DWORD_PTR = 1usize << core;
            let previous = unsafe { SetThreadAffinityMask(GetCurrentThread(), mask) };
            if previous == 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(())
            }
        }

        fn set_name(name: &str) -> Result<(), std::io::Error> {
            use winapi::um::processthreadsapi::{GetCurrentThread, SetThreadDescription};

            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let hr = unsafe { SetThreadDescription(GetCurrentThread(), wide.as_ptr()) };
            if hr < 0 {
                Err(std::io::Error::from_raw_os_error(hr))
            } else {
                Ok(())
            }
        }
    } else {
        fn set_affinity(_core: usize) -> Result<(), std::io::Error> {
            Ok(())
        }

        fn set_name(_name: &str) -> Result<(), std::io::Error> {
            Ok(())
        }
    }
}
