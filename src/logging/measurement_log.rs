use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::Context;
use tracing::error;

use crate::config::UdpPingConfig;
use crate::logging::compression::GzipCompression;
use crate::logging::rotating_writer::{PostRotateHook, RotatingFileWriter};
use crate::probe::outcome::{OutcomeRecord, OutcomeSink};

/// The measurement data log: one tab-separated Outcome Record per line, rotated on a short
///  interval, with rotated segments compressed unless that is switched off
pub struct MeasurementLog {
    writer: Mutex<RotatingFileWriter>,
}
impl MeasurementLog {
    pub fn open(config: &UdpPingConfig) -> anyhow::Result<MeasurementLog> {
        let post_rotate: Option<Box<dyn PostRotateHook>> = if config.compress {
            Some(Box::new(GzipCompression::new()))
        }
        else {
            None
        };

        let path = config.data_log_file();
        let writer = RotatingFileWriter::open(&path, config.data_rotation_interval, post_rotate)
            .with_context(|| format!("error opening data file {:?}", path))?;

        Ok(MeasurementLog {
            writer: Mutex::new(writer),
        })
    }
}

impl OutcomeSink for MeasurementLog {
    fn record(&self, record: &OutcomeRecord) {
        let line = format!("{}\n", record);

        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.write_line(line.as_bytes(), SystemTime::now()) {
            error!("error writing measurement record to {:?}: {}", writer.path(), e);
        }
    }
}
