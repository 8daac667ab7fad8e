// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptors, samples and the text exposition format.
//!
//! Samples are produced concurrently onto a [`MetricSink`] and rendered with
//! [`encode_text`] once a scrape is complete.

mod descriptor;
mod encode;
mod sample;

pub use descriptor::{Metric, MetricDescriptor, MetricDescriptors};
pub use encode::{encode_text, TEXT_CONTENT_TYPE};
pub use sample::{MetricSample, MetricSink, SampleReceiver};
