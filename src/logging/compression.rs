use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::logging::rotating_writer::PostRotateHook;

/// Replaces a rotated segment by a gzip archive `<segment>.gz` next to it. If compression fails,
///  the uncompressed segment is left in place and any partial archive is removed.
pub struct GzipCompression {
    level: Compression,
}
impl GzipCompression {
    pub fn new() -> GzipCompression {
        GzipCompression {
            level: Compression::default(),
        }
    }

    pub fn archive_name(segment: &Path) -> PathBuf {
        let mut name = segment.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    }

    fn compress(&self, segment: &Path, archive: &Path) -> io::Result<()> {
        let mut input = File::open(segment)?;
        let output = BufWriter::new(File::create(archive)?);

        let mut encoder = GzEncoder::new(output, self.level);
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?
            .flush()
    }
}
impl Default for GzipCompression {
    fn default() -> Self {
        Self::new()
    }
}

impl PostRotateHook for GzipCompression {
    fn on_rotated(&self, segment: &Path) -> anyhow::Result<()> {
        let archive = Self::archive_name(segment);

        if let Err(e) = self.compress(segment, &archive) {
            let _ = fs::remove_file(&archive);
            return Err(e).with_context(|| format!("error compressing {:?}", segment));
        }

        fs::remove_file(segment)
            .with_context(|| format!("error removing {:?} after compression", segment))
    }
}
