use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// One log line emitted by a subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub subsystem: String,
    pub message: String,
}

/// One telemetry reading emitted by a subsystem, e.g. gyroscope rates or wheel duty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub subsystem: String,
    pub label: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

enum FunnelMsg<T> {
    Record(T),
    Stop,
}

/// Multi-producer entry point of a funnel. Records are moved whole into the queue, so
/// producers can never interleave partial records.
pub struct Funnel<T> {
    tx: UnboundedSender<FunnelMsg<T>>,
}

impl<T> Clone for Funnel<T> {
    fn clone(&self) -> Self { Self { tx: self.tx.clone() } }
}

impl<T> Funnel<T> {
    pub fn submit(&self, record: T) {
        // The aggregator only disappears during shutdown, late records are dropped.
        let _ = self.tx.send(FunnelMsg::Record(record));
    }
}

/// The single consumer of a funnel.
pub struct Aggregator<T> {
    tx: UnboundedSender<FunnelMsg<T>>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> Aggregator<T> {
    fn spawn<F>(consume: F) -> (Funnel<T>, Self)
    where F: FnMut(T) + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Self::drain(rx, consume));
        (Funnel { tx: tx.clone() }, Self { tx, handle })
    }

    async fn drain<F>(mut rx: UnboundedReceiver<FunnelMsg<T>>, mut consume: F)
    where F: FnMut(T) {
        while let Some(msg) = rx.recv().await {
            match msg {
                FunnelMsg::Record(record) => consume(record),
                FunnelMsg::Stop => break,
            }
        }
    }

    /// Flushes everything submitted before this call, then ends the consumer.
    pub async fn stop(self) {
        let _ = self.tx.send(FunnelMsg::Stop);
        if let Err(e) = self.handle.await {
            crate::error!("Funnel aggregator ended abnormally: {e}");
        }
    }
}

/// Destination of the log aggregator.
pub trait LogSink: Send + 'static {
    fn write(&mut self, record: &LogRecord);
}

/// Prints subsystem logs on the console, tagged with the subsystem name.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write(&mut self, record: &LogRecord) {
        crate::log!("[{}] {}", record.subsystem, record.message);
    }
}

pub type LogFunnel = Funnel<LogRecord>;
pub type TelemetryFunnel = Funnel<TelemetrySample>;

pub fn spawn_log_aggregator(mut sink: Box<dyn LogSink>) -> (LogFunnel, Aggregator<LogRecord>) {
    Aggregator::spawn(move |record: LogRecord| sink.write(&record))
}

/// Spawns the telemetry aggregator, forwarding every sample to `route` in arrival order.
pub fn spawn_telemetry_aggregator(
    route: UnboundedSender<TelemetrySample>,
) -> (TelemetryFunnel, Aggregator<TelemetrySample>) {
    Aggregator::spawn(move |sample: TelemetrySample| {
        let _ = route.send(sample);
    })
}

/// Log handle bound to one subsystem name.
#[derive(Clone)]
pub struct SubsystemLogger {
    name: String,
    funnel: LogFunnel,
}

impl SubsystemLogger {
    pub fn new(name: impl Into<String>, funnel: LogFunnel) -> Self {
        Self { name: name.into(), funnel }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn log(&self, message: impl Into<String>) {
        self.funnel.submit(LogRecord { subsystem: self.name.clone(), message: message.into() });
    }
}

/// Telemetry handle bound to one subsystem name.
#[derive(Clone)]
pub struct TelemetryReporter {
    name: String,
    funnel: TelemetryFunnel,
}

impl TelemetryReporter {
    pub fn new(name: impl Into<String>, funnel: TelemetryFunnel) -> Self {
        Self { name: name.into(), funnel }
    }

    pub fn report(&self, label: impl Into<String>, value: impl Into<Value>) {
        self.funnel.submit(TelemetrySample {
            subsystem: self.name.clone(),
            label: label.into(),
            value: value.into(),
            timestamp: Utc::now(),
        });
    }
}
