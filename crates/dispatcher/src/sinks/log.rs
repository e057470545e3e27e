//! LogSink - logs event summaries via tracing

use contracts::{CapturedEvent, ContractError, DataSink};
use tracing::{debug, info, instrument};

/// Sink that logs one line per published event
pub struct LogSink {
    name: String,
    published: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: 0,
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_publish",
        skip(self, event, payload),
        fields(sink = %self.name, event_id = event.id)
    )]
    async fn publish(
        &mut self,
        event: &CapturedEvent,
        payload: &[u8],
    ) -> Result<(), ContractError> {
        self.published += 1;
        info!(
            sink = %self.name,
            event_id = event.id,
            table = %event.table,
            op = %event.op,
            bytes = payload.len(),
            "Change event published"
        );
        debug!(payload = %String::from_utf8_lossy(payload), "Payload");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, published = self.published, "LogSink closed");
        Ok(())
    }
}
