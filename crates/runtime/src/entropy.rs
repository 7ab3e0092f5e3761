//! Secure random generation
//!
//! Fills buffers from a secure random source and fails closed: if the source
//! cannot be used, or what it returned fails a liveness check, the caller
//! gets an error. There is no weaker fallback generator, and none should be
//! added; a failure here is fatal to whatever property the bytes were for.
//!
//! ## Sources
//!
//! - [`DeviceSource`]: reads a character device (default `/dev/urandom`,
//!   see `PLUGBRIDGE_ENTROPY_DEVICE`). Symlinks are not followed and anything
//!   that is not a character device is rejected at open time.
//! - `OsRngSource` (feature `crypto`): the operating system generator.
//!
//! Every fill goes through [`fill_random_from`], which rejects an all-zero
//! result as `InsufficientEntropy`.

use crate::config::BridgeConfig;
use plugbridge_core::error::set_runtime_error;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyError {
    /// The source cannot be opened, is not a character device, or a read failed
    DeviceUnavailable,
    /// The bytes returned failed the liveness check (all zero)
    InsufficientEntropy,
}

impl EntropyError {
    /// Status returned by the exported C function
    pub const fn code(self) -> i32 {
        match self {
            EntropyError::DeviceUnavailable => -1,
            EntropyError::InsufficientEntropy => -2,
        }
    }
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropyError::DeviceUnavailable => write!(f, "secure random device unavailable"),
            EntropyError::InsufficientEntropy => {
                write!(f, "secure random source returned insufficient entropy")
            }
        }
    }
}

impl std::error::Error for EntropyError {}

/// Something that can fill a buffer with random bytes
pub trait EntropySource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError>;
}

/// An open random character device
#[derive(Debug)]
pub struct DeviceSource {
    path: PathBuf,
    file: File,
}

impl DeviceSource {
    /// Open `path` read-only without following symlinks, and check that it
    /// is a character device.
    #[cfg(unix)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EntropyError> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
            .open(&path)
            .map_err(|e| {
                error!(device = %path.display(), "cannot open entropy device: {}", e);
                EntropyError::DeviceUnavailable
            })?;

        // Lightly verify that the device node looks sane
        let is_char_device = file
            .metadata()
            .map(|m| m.file_type().is_char_device())
            .unwrap_or(false);
        if !is_char_device {
            error!(device = %path.display(), "entropy source is not a character device");
            return Err(EntropyError::DeviceUnavailable);
        }
        Ok(Self { path, file })
    }

    #[cfg(not(unix))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EntropyError> {
        error!(device = %path.as_ref().display(), "entropy devices are only supported on unix");
        Err(EntropyError::DeviceUnavailable)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntropySource for DeviceSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => {
                    error!(device = %self.path.display(), "entropy device hit end of file");
                    return Err(EntropyError::DeviceUnavailable);
                }
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                    continue;
                }
                Err(e) => {
                    error!(device = %self.path.display(), "entropy device read failed: {}", e);
                    return Err(EntropyError::DeviceUnavailable);
                }
            }
        }
        Ok(())
    }
}

/// The operating system generator
#[cfg(feature = "crypto")]
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngSource;

#[cfg(feature = "crypto")]
impl EntropySource for OsRngSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
        use rand::RngCore;

        rand::rngs::OsRng.try_fill_bytes(buf).map_err(|e| {
            error!("OS random generator failed: {}", e);
            EntropyError::DeviceUnavailable
        })
    }
}

/// True when at least one bit is set
fn got_data(buf: &[u8]) -> bool {
    buf.iter().fold(0u8, |acc, b| acc | b) != 0
}

/// Fill `buf` from `source` and run the liveness check.
///
/// On error the contents of `buf` are unspecified and must not be used.
/// An empty buffer succeeds without touching the source.
pub fn fill_random_from<S>(source: &mut S, buf: &mut [u8]) -> Result<(), EntropyError>
where
    S: EntropySource + ?Sized,
{
    if buf.is_empty() {
        return Ok(());
    }
    source.fill(buf)?;
    if !got_data(buf) {
        error!(len = buf.len(), "entropy source returned an all-zero buffer");
        return Err(EntropyError::InsufficientEntropy);
    }
    Ok(())
}

/// Fill `buf` from the configured entropy device.
pub fn fill_random(buf: &mut [u8]) -> Result<(), EntropyError> {
    if buf.is_empty() {
        return Ok(());
    }
    let config = BridgeConfig::from_env();
    let mut device = DeviceSource::open(&config.entropy_device)?;
    fill_random_from(&mut device, buf)
}

/// Status for a null buffer with a non-zero length
pub const FILL_RANDOM_BAD_ARGUMENT: i32 = -3;

/// Fill `len` bytes at `buf` with secure random data.
///
/// Returns 0 on success, -1 if the device is unavailable, -2 on insufficient
/// entropy, -3 for a null buffer. On failure the message is available through
/// `plugbridge_take_error`.
///
/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugbridge_fill_random(buf: *mut u8, len: usize) -> i32 {
    if len == 0 {
        return 0;
    }
    if buf.is_null() {
        set_runtime_error("fill_random: null buffer");
        return FILL_RANDOM_BAD_ARGUMENT;
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(buf, len) };
    match fill_random(slice) {
        Ok(()) => 0,
        Err(e) => {
            set_runtime_error(format!("fill_random: {}", e));
            e.code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugbridge_core::error::take_runtime_error;

    /// A broken generator that always hands back zeros
    struct ZeroSource;

    impl EntropySource for ZeroSource {
        fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
            buf.fill(0);
            Ok(())
        }
    }

    struct CountingSource(usize);

    impl EntropySource for CountingSource {
        fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
            self.0 += 1;
            buf.fill(0xA5);
            Ok(())
        }
    }

    #[test]
    fn test_all_zero_source_fails_closed() {
        let mut buf = [0xFFu8; 32];
        assert_eq!(
            fill_random_from(&mut ZeroSource, &mut buf),
            Err(EntropyError::InsufficientEntropy)
        );
    }

    #[test]
    fn test_empty_buffer_skips_source() {
        let mut source = CountingSource(0);
        assert_eq!(fill_random_from(&mut source, &mut []), Ok(()));
        assert_eq!(source.0, 0);

        let mut buf = [0u8; 4];
        assert_eq!(fill_random_from(&mut source, &mut buf), Ok(()));
        assert_eq!(source.0, 1);
        assert_eq!(buf, [0xA5; 4]);
    }

    #[test]
    fn test_dyn_source() {
        let source: &mut dyn EntropySource = &mut ZeroSource;
        let mut buf = [0u8; 8];
        assert!(fill_random_from(source, &mut buf).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_regular_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0x5Au8; 64]).unwrap();
        assert_eq!(
            DeviceSource::open(file.path()).unwrap_err(),
            EntropyError::DeviceUnavailable
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_device_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            DeviceSource::open(dir.path().join("nope")).unwrap_err(),
            EntropyError::DeviceUnavailable
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_symlink_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("urandom");
        std::os::unix::fs::symlink("/dev/urandom", &link).unwrap();
        assert_eq!(
            DeviceSource::open(&link).unwrap_err(),
            EntropyError::DeviceUnavailable
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dev_zero_is_insufficient() {
        let mut buf = [0xFFu8; 32];
        assert_eq!(
            fill_random_from(&mut DeviceSource::open("/dev/zero").unwrap(), &mut buf),
            Err(EntropyError::InsufficientEntropy)
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dev_urandom_fills() {
        let mut buf = [0u8; 32];
        let mut device = DeviceSource::open("/dev/urandom").unwrap();
        assert_eq!(device.path(), Path::new("/dev/urandom"));
        fill_random_from(&mut device, &mut buf).unwrap();
        assert!(got_data(&buf));
    }

    #[cfg(feature = "crypto")]
    #[test]
    fn test_os_rng_fills() {
        let mut buf = [0u8; 64];
        fill_random_from(&mut OsRngSource, &mut buf).unwrap();
        assert!(got_data(&buf));
    }

    #[test]
    fn test_ffi_null_buffer() {
        unsafe {
            assert_eq!(plugbridge_fill_random(std::ptr::null_mut(), 0), 0);
            assert_eq!(
                plugbridge_fill_random(std::ptr::null_mut(), 8),
                FILL_RANDOM_BAD_ARGUMENT
            );
        }
        assert_eq!(
            take_runtime_error(),
            Some("fill_random: null buffer".to_string())
        );
    }

    #[test]
    fn test_error_codes_and_display() {
        assert_eq!(EntropyError::DeviceUnavailable.code(), -1);
        assert_eq!(EntropyError::InsufficientEntropy.code(), -2);
        assert_eq!(
            EntropyError::DeviceUnavailable.to_string(),
            "secure random device unavailable"
        );
    }
}
