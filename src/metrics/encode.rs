// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::fmt::Write;

use super::{Metric, MetricDescriptors, MetricSample};

/// Content type of [`encode_text`] output.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in the Prometheus text exposition format.
///
/// Families appear in descriptor order and only when they have samples.
/// Samples within a family are sorted by label values, so the same inventory
/// always renders to the same bytes.
#[must_use]
pub fn encode_text(descriptors: &MetricDescriptors, samples: &[MetricSample]) -> String {
    let mut families: BTreeMap<Metric, Vec<&MetricSample>> = BTreeMap::new();
    for sample in samples {
        families.entry(sample.metric).or_default().push(sample);
    }

    let mut output = String::new();
    for descriptor in descriptors.iter() {
        let Some(family) = families.get_mut(&descriptor.metric()) else {
            continue;
        };
        family.sort_by(|a, b| {
            a.labels
                .iter()
                .map(|(_, v)| v)
                .cmp(b.labels.iter().map(|(_, v)| v))
        });

        let name = descriptor.name();
        let _ = writeln!(output, "# HELP {name} {}", escape_help(descriptor.help()));
        let _ = writeln!(output, "# TYPE {name} gauge");
        for sample in family.iter() {
            output.push_str(name);
            if !sample.labels.is_empty() {
                output.push('{');
                for (i, (key, value)) in sample.labels.iter().enumerate() {
                    if i > 0 {
                        output.push(',');
                    }
                    let _ = write!(output, "{key}=\"{}\"", escape_label_value(value));
                }
                output.push('}');
            }
            let _ = writeln!(output, " {}", format_value(sample.value));
        }
    }
    output
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}
