use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::warn;

/// Called synchronously for every segment that was closed by a rotation, with the segment's
///  path after renaming.
pub trait PostRotateHook: Send + Sync + 'static {
    fn on_rotated(&self, segment: &Path) -> anyhow::Result<()>;
}


/// An append-only file that is rotated after a fixed time interval: the current file is
///  renamed to `<file>.<segment start>` and a new file is started under the original name.
///
/// Rotation is checked lazily before each write, so an idle file is not rotated until the next
///  write. A pre-existing file is continued, its modification time counting as segment start.
///
/// NB: When this writer backs the operational log, the post rotation hook must not emit
///      tracing events since that would re-enter the writer
pub struct RotatingFileWriter {
    path: PathBuf,
    interval: Duration,
    file: File,
    segment_start: SystemTime,
    post_rotate: Option<Box<dyn PostRotateHook>>,
}
impl RotatingFileWriter {
    pub fn open(path: impl Into<PathBuf>, interval: Duration, post_rotate: Option<Box<dyn PostRotateHook>>) -> io::Result<RotatingFileWriter> {
        let path = path.into();
        let file = Self::open_file(&path)?;
        let segment_start = file.metadata()
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());

        Ok(RotatingFileWriter {
            path,
            interval,
            file,
            segment_start,
            post_rotate,
        })
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_rotation_due(&self, now: SystemTime) -> bool {
        now >= self.segment_start + self.interval
    }

    /// Writes a complete line (or several), rotating first if the current segment is due
    pub fn write_line(&mut self, line: &[u8], now: SystemTime) -> io::Result<()> {
        if self.is_rotation_due(now) {
            self.rotate(now)?;
        }
        self.file.write_all(line)
    }

    /// Closes the current segment and starts a new one. Returns the path of the closed segment
    ///  as it was renamed (before the post rotation hook has run).
    pub fn rotate(&mut self, now: SystemTime) -> io::Result<PathBuf> {
        self.file.flush()?;

        let segment = rotated_segment_name(&self.path, self.segment_start);
        fs::rename(&self.path, &segment)?;

        self.file = Self::open_file(&self.path)?;
        self.segment_start = now;

        if let Some(hook) = &self.post_rotate {
            if let Err(e) = hook.on_rotated(&segment) {
                warn!("error post-processing rotated segment {:?}: {:#}", segment, e);
            }
        }
        Ok(segment)
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = SystemTime::now();
        if self.is_rotation_due(now) {
            self.rotate(now)?;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

pub fn rotated_segment_name(path: &Path, segment_start: SystemTime) -> PathBuf {
    let suffix = DateTime::<Utc>::from(segment_start).format("%Y-%m-%d_%H-%M-%S");

    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", suffix));
    PathBuf::from(name)
}


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::UNIX_EPOCH;

    use super::*;

    struct RecordingHook(Arc<Mutex<Vec<PathBuf>>>);
    impl PostRotateHook for RecordingHook {
        fn on_rotated(&self, segment: &Path) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(segment.to_path_buf());
            Ok(())
        }
    }

    struct FailingHook;
    impl PostRotateHook for FailingHook {
        fn on_rotated(&self, _segment: &Path) -> anyhow::Result<()> {
            anyhow::bail!("simulated failure")
        }
    }

    #[test]
    fn test_rotated_segment_name() {
        let start = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            rotated_segment_name(Path::new("/nne/data/uping_3.dat"), start),
            PathBuf::from("/nne/data/uping_3.dat.2023-11-14_22-13-20"),
        );
    }

    #[test]
    fn test_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uping_1.dat");

        let segments = Arc::new(Mutex::new(Vec::new()));
        let mut writer = RotatingFileWriter::open(&path, Duration::from_secs(15), Some(Box::new(RecordingHook(segments.clone())))).unwrap();

        let t0 = SystemTime::now();
        writer.write_line(b"a\n", t0).unwrap();
        writer.write_line(b"b\n", t0 + Duration::from_secs(14)).unwrap();
        assert!(segments.lock().unwrap().is_empty());

        writer.write_line(b"c\n", t0 + Duration::from_secs(16)).unwrap();

        let segments = segments.lock().unwrap().clone();
        assert_eq!(segments.len(), 1);
        assert_eq!(fs::read_to_string(&segments[0]).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "c\n");
    }

    #[test]
    fn test_new_segment_starts_at_rotation_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uping_1.dat");
        let mut writer = RotatingFileWriter::open(&path, Duration::from_secs(15), None).unwrap();

        let t0 = SystemTime::now() + Duration::from_secs(100);
        writer.write_line(b"a\n", t0).unwrap();
        assert!(!writer.is_rotation_due(t0 + Duration::from_secs(14)));
        assert!(writer.is_rotation_due(t0 + Duration::from_secs(15)));
    }

    #[test]
    fn test_existing_file_is_continued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uping_1.log");
        fs::write(&path, "old\n").unwrap();

        let mut writer = RotatingFileWriter::open(&path, Duration::from_secs(86400), None).unwrap();
        writer.write_line(b"new\n", SystemTime::now()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_hook_failure_does_not_fail_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uping_1.dat");
        let mut writer = RotatingFileWriter::open(&path, Duration::from_secs(1), Some(Box::new(FailingHook))).unwrap();

        let t0 = SystemTime::now();
        writer.write_line(b"a\n", t0).unwrap();
        writer.write_line(b"b\n", t0 + Duration::from_secs(2)).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "b\n");
    }
}
