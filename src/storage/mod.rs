pub mod record;
pub mod sink;

pub use record::NodeRecord;
pub use sink::{FileSink, MemorySink, RecordSink};

use log::warn;

/// Per-operation handle the trees materialize nodes through.
///
/// Sink failures never escape: the in-memory tree stays authoritative, the
/// failure is logged and counted, and the operation carries on.
pub(crate) struct RecordWriter<'a> {
    sink: &'a mut dyn RecordSink,
    failures: usize,
}

impl<'a> RecordWriter<'a> {
    pub(crate) fn new(sink: &'a mut dyn RecordSink) -> Self {
        Self { sink, failures: 0 }
    }

    pub(crate) fn write(&mut self, id: &str, record: &NodeRecord) {
        if let Err(e) = self.sink.write(id, record) {
            warn!("failed to write record {}: {}", id, e);
            self.failures += 1;
        }
    }

    pub(crate) fn remove(&mut self, id: &str) {
        if let Err(e) = self.sink.remove(id) {
            warn!("failed to remove record {}: {}", id, e);
            self.failures += 1;
        }
    }

    pub(crate) fn failures(&self) -> usize {
        self.failures
    }
}
