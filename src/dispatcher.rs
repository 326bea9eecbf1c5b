use crate::buffer::BulkBuffer;
use crate::encoder::{EncodedDocument, RecordEncoder};
use crate::record::{LogRecord, Severity};
use crate::scheduler::{FlushSignal, Lifecycle};
use crate::stats::SinkStats;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Always-on sink writing one JSON document per line, stdout by default.
pub struct LocalSink {
    writer: Mutex<Box<dyn Write + Send>>,
    min_severity: Severity,
}

impl LocalSink {
    pub fn new(writer: impl Write + Send + 'static, min_severity: Severity) -> Self {
        LocalSink {
            writer: Mutex::new(Box::new(writer)),
            min_severity,
        }
    }

    pub fn stdout(min_severity: Severity) -> Self {
        Self::new(io::stdout(), min_severity)
    }

    fn write(&self, doc: &EncodedDocument) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(doc.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// Sink feeding the bulk buffer of the remote backend.
pub struct RemoteSink {
    buffer: Arc<BulkBuffer>,
    signal: FlushSignal,
    flush_bytes: usize,
    lifecycle: Arc<Lifecycle>,
    min_severity: Severity,
}

impl RemoteSink {
    pub fn new(
        buffer: Arc<BulkBuffer>,
        signal: FlushSignal,
        flush_bytes: usize,
        lifecycle: Arc<Lifecycle>,
        min_severity: Severity,
    ) -> Self {
        RemoteSink {
            buffer,
            signal,
            flush_bytes,
            lifecycle,
            min_severity,
        }
    }

    /// Append `doc` and ask for a flush once the threshold is reached.
    ///
    /// Documents arriving after shutdown began are not buffered. The buffer
    /// itself refuses appends once the final flush has taken its snapshot.
    fn write(&self, doc: &EncodedDocument, stats: &SinkStats) {
        if !self.lifecycle.is_running() {
            return;
        }
        let Some(size) = self.buffer.append(doc) else {
            return;
        };
        SinkStats::incr(&stats.buffered, 1);
        if size >= self.flush_bytes {
            self.signal.request();
        }
    }
}

/// The fixed set of destinations a [`Dispatcher`] writes to.
pub enum SinkTarget {
    Local(LocalSink),
    Remote(RemoteSink),
}

impl SinkTarget {
    fn min_severity(&self) -> Severity {
        match self {
            SinkTarget::Local(sink) => sink.min_severity,
            SinkTarget::Remote(sink) => sink.min_severity,
        }
    }

    fn accepts(&self, severity: Severity) -> bool {
        severity >= self.min_severity()
    }
}

/// Fans records out to every [`SinkTarget`] whose severity filter accepts
/// them. Never blocks on I/O other than the local writer and never reports
/// an error to the caller.
pub struct Dispatcher {
    encoder: RecordEncoder,
    targets: Vec<SinkTarget>,
    stats: Arc<SinkStats>,
}

impl Dispatcher {
    pub fn new(encoder: RecordEncoder, targets: Vec<SinkTarget>, stats: Arc<SinkStats>) -> Self {
        Dispatcher {
            encoder,
            targets,
            stats,
        }
    }

    /// Whether any target would take a record of this severity.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.targets.iter().any(|t| t.accepts(severity))
    }

    /// Whether a remote target is configured.
    pub fn ships_remotely(&self) -> bool {
        self.targets
            .iter()
            .any(|t| matches!(t, SinkTarget::Remote(_)))
    }

    pub fn emit(&self, record: &LogRecord) {
        SinkStats::incr(&self.stats.emitted, 1);
        self.dispatch(record, true);
    }

    /// Like [`emit`](Self::emit) but skips the remote target. Used for the
    /// crate's own diagnostics so a failing backend does not receive reports
    /// about itself. Not counted in `emitted`.
    pub fn emit_local(&self, record: &LogRecord) {
        self.dispatch(record, false);
    }

    fn dispatch(&self, record: &LogRecord, include_remote: bool) {
        let wanted = |t: &&SinkTarget| {
            t.accepts(record.severity) && (include_remote || !matches!(t, SinkTarget::Remote(_)))
        };
        if !self.targets.iter().any(|t| wanted(&t)) {
            return;
        }

        let doc = self.encoder.encode(record);
        for target in self.targets.iter().filter(|t| wanted(t)) {
            match target {
                SinkTarget::Local(sink) => {
                    if sink.write(&doc).is_err() {
                        SinkStats::incr(&self.stats.local_write_errors, 1);
                    }
                }
                SinkTarget::Remote(sink) => sink.write(&doc, &self.stats),
            }
        }
    }
}
