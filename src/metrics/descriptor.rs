// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use super::MetricSample;

const TENANT_LABELS: &[&str] = &["region", "island"];
const CLUSTER_LABELS: &[&str] = &["region", "island", "ecsCluster"];
const SERVICE_LABELS: &[&str] = &["region", "island", "ecsCluster", "service"];

/// The metrics the exporter produces, in exposition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Up,
    ClustersTotal,
    ServicesTotal,
    ServiceDesiredTasks,
    ServicePendingTasks,
    ServiceRunningTasks,
    ServiceDeployments,
}

impl Metric {
    /// Every metric, in exposition order.
    pub const ALL: [Metric; 7] = [
        Metric::Up,
        Metric::ClustersTotal,
        Metric::ServicesTotal,
        Metric::ServiceDesiredTasks,
        Metric::ServicePendingTasks,
        Metric::ServiceRunningTasks,
        Metric::ServiceDeployments,
    ];

    /// Name without the namespace prefix.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Metric::Up => "up",
            Metric::ClustersTotal => "clusters_total",
            Metric::ServicesTotal => "services_total",
            Metric::ServiceDesiredTasks => "service_desired_tasks_total",
            Metric::ServicePendingTasks => "service_pending_tasks_total",
            Metric::ServiceRunningTasks => "service_running_tasks_total",
            Metric::ServiceDeployments => "service_deployments_total",
        }
    }

    #[must_use]
    pub fn help(self) -> &'static str {
        match self {
            Metric::Up => "Was the last query of ecs successful.",
            Metric::ClustersTotal => "The total number of ecs clusters.",
            Metric::ServicesTotal => "The total number of services.",
            Metric::ServiceDesiredTasks => "The number of tasks to have running.",
            Metric::ServicePendingTasks => "The number of tasks that are in the PENDING state.",
            Metric::ServiceRunningTasks => "The number of tasks that are in the RUNNING state.",
            Metric::ServiceDeployments => "The number of deployments a service has.",
        }
    }

    /// Label names, in order.
    #[must_use]
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Metric::Up | Metric::ClustersTotal => TENANT_LABELS,
            Metric::ServicesTotal => CLUSTER_LABELS,
            _ => SERVICE_LABELS,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Static description of one metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    metric: Metric,
    name: String,
}

impl MetricDescriptor {
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Fully qualified name, `<namespace>_<name>`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn help(&self) -> &'static str {
        self.metric.help()
    }

    #[must_use]
    pub fn labels(&self) -> &'static [&'static str] {
        self.metric.labels()
    }
}

/// The descriptors for one namespace.
///
/// Built once at startup and shared read-only by the collector and the
/// exposition encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptors {
    namespace: String,
    descriptors: Vec<MetricDescriptor>,
}

impl MetricDescriptors {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let descriptors = Metric::ALL
            .iter()
            .map(|&metric| MetricDescriptor {
                metric,
                name: qualified_name(&namespace, metric.short_name()),
            })
            .collect();
        Self {
            namespace,
            descriptors,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn get(&self, metric: Metric) -> &MetricDescriptor {
        // descriptors follow Metric::ALL, which matches the enum order
        &self.descriptors[metric as usize]
    }

    /// All descriptors in exposition order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter()
    }

    /// Build a sample of `metric` from label values given in label order.
    ///
    /// Missing values are filled with empty strings; extra values are ignored.
    #[must_use]
    pub fn sample(&self, metric: Metric, values: &[&str], value: f64) -> MetricSample {
        let descriptor = self.get(metric);
        let labels = descriptor
            .labels()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    (*name).to_string(),
                    values.get(i).copied().unwrap_or_default().to_string(),
                )
            })
            .collect();
        MetricSample {
            metric,
            name: descriptor.name.clone(),
            labels,
            value,
        }
    }
}

fn qualified_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}_{name}")
    }
}
