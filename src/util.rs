use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

// -------- robust file ops with backoff (Windows-friendly) --------

const FILE_TRIES: usize = 16;
const FILE_DELAY_MS: u64 = 50;

/// Return true for transient/retriable I/O errors often seen on Windows when
/// filter drivers (AV/backup), synced folders, or sharing violations occur.
fn is_retriable_io_error(e: &io::Error) -> bool {
    // 5 = access denied, 32 = sharing violation, 33 = lock violation,
    // 1224 = user-mapped section open, 21 = device not ready
    matches!(e.raw_os_error(), Some(5) | Some(32) | Some(33) | Some(1224) | Some(21))
}

/// Run `op` until it succeeds or fails with a non-retriable error.
/// Delay grows linearly with the attempt number.
fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

/// Read a whole UTF-8 file, retrying transient open failures.
pub fn read_text_with_backoff(path: &Path) -> Result<String> {
    let mut f = with_backoff(FILE_TRIES, FILE_DELAY_MS, || fs::File::open(path))
        .with_context(|| format!("open {}", path.display()))?;
    let mut s = String::new();
    f.read_to_string(&mut s).with_context(|| format!("read {}", path.display()))?;
    Ok(s)
}

/// Remove a file with retries/backoff. Succeeds if the file doesn't exist.
pub fn remove_with_backoff(path: &Path) -> Result<()> {
    with_backoff(FILE_TRIES, FILE_DELAY_MS, || match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
    .with_context(|| format!("remove {}", path.display()))
}

/// Write `bytes` to a sibling temp file, then promote it over `dest`.
/// If rename fails (e.g., due to sharing), fall back to copy+remove.
pub fn write_atomic_with_backoff(dest: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let tmp = dest.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut f = with_backoff(FILE_TRIES, FILE_DELAY_MS, || fs::File::create(&tmp))
            .with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(bytes).with_context(|| format!("write {}", tmp.display()))?;
        f.flush()?;
    }

    match with_backoff(FILE_TRIES, FILE_DELAY_MS, || fs::rename(&tmp, dest)) {
        Ok(()) => Ok(()),
        Err(_) => {
            with_backoff(FILE_TRIES, FILE_DELAY_MS, || fs::copy(&tmp, dest))
                .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
            remove_with_backoff(&tmp)
        }
    }
}
