// SPDX-License-Identifier: MIT OR Apache-2.0

use tokio::sync::mpsc;

use super::Metric;

/// One labeled observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: Metric,
    /// Fully qualified metric name
    pub name: String,
    /// `(label, value)` pairs in descriptor order
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl MetricSample {
    /// Value of the label `name`.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether every `(label, value)` in `expected` matches.
    #[must_use]
    pub fn matches(&self, expected: &[(&str, &str)]) -> bool {
        expected
            .iter()
            .all(|(name, value)| self.label(name) == Some(*value))
    }
}

/// Producer side of the sample stream. Cheap to clone; any number of tasks
/// may emit concurrently.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::UnboundedSender<MetricSample>,
}

/// Consumer side of the sample stream.
#[derive(Debug)]
pub struct SampleReceiver {
    rx: mpsc::UnboundedReceiver<MetricSample>,
}

impl MetricSink {
    /// Create a connected sink and receiver.
    #[must_use]
    pub fn channel() -> (MetricSink, SampleReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MetricSink { tx }, SampleReceiver { rx })
    }

    /// Emit a sample. Samples sent after the receiver is gone are dropped.
    pub fn emit(&self, sample: MetricSample) {
        let _ = self.tx.send(sample);
    }
}

impl SampleReceiver {
    /// Wait for every sink to be dropped and return all samples.
    pub async fn collect_all(mut self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        while let Some(sample) = self.rx.recv().await {
            samples.push(sample);
        }
        samples
    }
}
