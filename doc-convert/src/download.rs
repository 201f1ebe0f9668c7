use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crate::config::DownloadPolicy;
use crate::error::DownloadError;

const COPY_BUF_BYTES: usize = 64 * 1024;

/// Response body of one download attempt.
pub struct DownloadBody {
    /// True when the server honored the range request; bytes continue the `.part` file.
    pub resumed: bool,
    pub reader: Box<dyn Read + Send>,
}

impl DownloadBody {
    /// Full body from byte 0.
    pub fn fresh(reader: impl Read + Send + 'static) -> Self {
        Self { resumed: false, reader: Box::new(reader) }
    }

    /// Remainder after the requested offset.
    pub fn resumed(reader: impl Read + Send + 'static) -> Self {
        Self { resumed: true, reader: Box::new(reader) }
    }
}

/// `<dest>.part`, where bytes accumulate until the transfer completes.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Download into `dest`, resuming from whatever a previous attempt left in the `.part` file.
///
/// `next_url` is asked for a fresh URL before every attempt. Transient failures are retried
/// with backoff up to `policy.max_attempts`; anything else returns at once. Returns the final size.
pub fn download_with_resume<U, O>(dest: &Path, policy: &DownloadPolicy, mut next_url: U, mut open: O) -> Result<u64, DownloadError>
where
    U: FnMut() -> Result<String, DownloadError>,
    O: FnMut(&str, u64) -> Result<DownloadBody, DownloadError>,
{
    if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let part = part_path(dest);
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        match fetch_once(&part, &mut next_url, &mut open) {
            Ok(()) => {
                fs::rename(&part, dest)?;
                let size = fs::metadata(dest)?.len();
                log::info!("downloaded {} ({size} bytes, attempt {attempt})", dest.display());
                return Ok(size);
            }
            Err(e) if e.is_transient() => {
                last = e.to_string();
                if attempt < attempts {
                    let delay = policy.backoff(attempt);
                    log::warn!("download attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                    thread::sleep(delay);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(DownloadError::Exhausted { attempts, last })
}

fn fetch_once<U, O>(part: &Path, next_url: &mut U, open: &mut O) -> Result<(), DownloadError>
where
    U: FnMut() -> Result<String, DownloadError>,
    O: FnMut(&str, u64) -> Result<DownloadBody, DownloadError>,
{
    let url = next_url()?;
    let offset = match fs::metadata(part) { Ok(m) => m.len(), Err(_) => 0 };
    let body = open(&url, offset)?;
    let mut file = if body.resumed && offset > 0 {
        log::debug!("resuming {} at byte {offset}", part.display());
        OpenOptions::new().append(true).open(part)?
    } else {
        File::create(part)?
    };
    copy_body(body.reader, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Read errors come from the network and are transient; write errors are local and are not.
fn copy_body(mut reader: Box<dyn Read + Send>, file: &mut File) -> Result<u64, DownloadError> {
    let mut buf = vec![0u8; COPY_BUF_BYTES];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DownloadError::Transient(format!("connection dropped after {written} bytes: {e}"))),
        };
        file.write_all(&buf[..n])?;
        written += n as u64;
    }
}
