//! Size-rotated file writer shared by the tracing file sinks and application loggers.

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl RotWriter {
    /// Open (or create) `log_path`, rotating once it grows past `max_bytes`.
    ///
    /// Retention prefers `max_backups` when given, else `max_age_days` (default 1 day).
    pub fn open(
        log_path: &Path,
        max_bytes: usize,
        max_age_days: Option<u32>,
        max_backups: Option<usize>,
    ) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let age = chrono::Duration::days(max_age_days.unwrap_or(1) as i64);
        let limit = if let Some(n) = max_backups {
            FileLimit::MaxFiles(n)
        } else {
            FileLimit::Age(age)
        };

        let rot = FileRotate::new(
            log_path,
            AppendTimestamp::default(limit),
            ContentLimit::BytesSurpassed(max_bytes),
            Compression::None,
            None,
        );

        Ok(Self(Arc::new(Mutex::new(rot))))
    }
}

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

pub(crate) fn resolve_log_path(file: &str, base_dir: &Path) -> std::path::PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}
