// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use ecs_exporter_rs::client::{GrpcClientConfig, GrpcClientFactory};
use ecs_exporter_rs::metrics::encode_text;
use ecs_exporter_rs::testkit::{services, FakeClientFactory, FakeGateway, FakeInventory};
use ecs_exporter_rs::{Exporter, ExporterConfig, Metric, MetricSample, ScrapeSummary};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

const BLUE_ROLE: &str = "arn:aws:iam::111111111111:role/ecs-exporter";
const GREEN_ROLE: &str = "arn:aws:iam::222222222222:role/ecs-exporter";

fn config(roles: &[(&str, &str)]) -> ExporterConfig {
    ExporterConfig {
        region: Some("eu-west-1".to_string()),
        roles: roles
            .iter()
            .map(|(island, role)| (island.to_string(), role.to_string()))
            .collect(),
        ..Default::default()
    }
}

fn exporter(config: &ExporterConfig, factory: FakeClientFactory) -> Exporter {
    Exporter::new(config, Arc::new(factory)).expect("valid config")
}

fn find<'a>(samples: &'a [MetricSample], metric: Metric, labels: &[(&str, &str)]) -> Vec<&'a MetricSample> {
    samples
        .iter()
        .filter(|s| s.metric == metric && s.matches(labels))
        .collect()
}

fn value(samples: &[MetricSample], metric: Metric, labels: &[(&str, &str)]) -> Option<f64> {
    match find(samples, metric, labels).as_slice() {
        [single] => Some(single.value),
        [] => None,
        many => panic!("{} samples of {metric} for {labels:?}", many.len()),
    }
}

#[tokio::test]
async fn test_no_roles_collects_one_anonymous_tenant() {
    let inventory = Arc::new(FakeInventory::new().with_cluster("default", services("default", 3)));
    let factory = FakeClientFactory::new().with_tenant("", inventory);
    let exporter = exporter(&config(&[]), factory);

    let (samples, summary) = exporter.scrape().await;

    assert_eq!(summary.tenants, 1);
    assert_eq!(summary.up, 1);
    assert_eq!(value(&samples, Metric::Up, &[("island", ""), ("region", "eu-west-1")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ClustersTotal, &[("island", "")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("ecsCluster", "default")]), Some(3.0));
    assert_eq!(find(&samples, Metric::ServiceDesiredTasks, &[]).len(), 3);
}

#[tokio::test]
async fn test_failed_batch_drops_cluster_service_samples() {
    let prod_services = services("prod", 25);
    let inventory = Arc::new(
        FakeInventory::new()
            .with_cluster("prod", prod_services.clone())
            .with_cluster("staging", services("staging", 4)),
    );
    inventory.fail_describe_services_containing(&prod_services[10].id, tonic::Status::unavailable("throttled"));
    let factory = FakeClientFactory::new().with_tenant("", inventory.clone());
    let exporter = exporter(&config(&[]), factory);

    let (samples, summary) = exporter.scrape().await;

    let mut prod_batches: Vec<usize> = inventory.calls().describe_services_batch_sizes();
    prod_batches.sort_unstable();
    assert_eq!(prod_batches, vec![4, 5, 10, 10]);

    assert_eq!(value(&samples, Metric::ClustersTotal, &[]), Some(2.0));
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("ecsCluster", "prod")]), None);
    for metric in [
        Metric::ServiceDesiredTasks,
        Metric::ServicePendingTasks,
        Metric::ServiceRunningTasks,
        Metric::ServiceDeployments,
    ] {
        assert!(find(&samples, metric, &[("ecsCluster", "prod")]).is_empty());
        assert_eq!(find(&samples, metric, &[("ecsCluster", "staging")]).len(), 4);
    }
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("ecsCluster", "staging")]), Some(4.0));
    assert_eq!(summary.failed_clusters, 1);
}

#[tokio::test]
async fn test_single_cluster_batches_with_failed_second_batch() {
    let prod_services = services("prod", 25);
    let inventory = Arc::new(FakeInventory::new().with_cluster("prod", prod_services.clone()));
    inventory.fail_describe_services_containing(&prod_services[15].id, tonic::Status::unavailable("throttled"));
    let factory = FakeClientFactory::new().with_tenant("", inventory.clone());
    let exporter = exporter(&config(&[]), factory);

    let (samples, _) = exporter.scrape().await;

    assert_eq!(inventory.calls().describe_services(), 3);
    assert_eq!(value(&samples, Metric::Up, &[]), Some(1.0));
    assert_eq!(value(&samples, Metric::ClustersTotal, &[]), Some(1.0));
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("ecsCluster", "prod")]), None);
    assert_eq!(samples.len(), 2);
}

#[tokio::test]
async fn test_cluster_failure_is_tenant_scoped() {
    let blue = Arc::new(FakeInventory::new().with_cluster("blue-prod", services("blue-prod", 2)));
    blue.fail_list_clusters(tonic::Status::permission_denied("not authorized"));
    let green = Arc::new(
        FakeInventory::new()
            .with_cluster("green-prod", services("green-prod", 12))
            .with_cluster("green-dev", services("green-dev", 1)),
    );
    let factory = FakeClientFactory::new()
        .with_tenant("blue", blue)
        .with_tenant("green", green);
    let exporter = exporter(&config(&[("blue", "roleA"), ("green", "roleB")]), factory);

    let (samples, summary) = exporter.scrape().await;

    assert_eq!(
        summary,
        ScrapeSummary {
            tenants: 2,
            up: 1,
            down: 1,
            ..Default::default()
        }
    );
    assert_eq!(value(&samples, Metric::Up, &[("island", "blue")]), Some(0.0));
    assert_eq!(value(&samples, Metric::ClustersTotal, &[("island", "blue")]), None);

    assert_eq!(value(&samples, Metric::Up, &[("island", "green")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ClustersTotal, &[("island", "green")]), Some(2.0));
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("ecsCluster", "green-prod")]), Some(12.0));
    assert_eq!(find(&samples, Metric::ServiceRunningTasks, &[("island", "green")]).len(), 13);

    // the next scrape is unaffected
    let (again, _) = exporter.scrape().await;
    assert_eq!(value(&again, Metric::Up, &[("island", "green")]), Some(1.0));
}

#[tokio::test]
async fn test_auth_failure_emits_nothing() {
    let green = Arc::new(FakeInventory::new().with_cluster("green-prod", services("green-prod", 1)));
    let factory = FakeClientFactory::new()
        .with_auth_failure("blue")
        .with_tenant("green", green);
    let exporter = exporter(&config(&[("blue", BLUE_ROLE), ("green", GREEN_ROLE)]), factory);

    let (samples, summary) = exporter.scrape().await;

    assert_eq!(summary.skipped, 1);
    assert!(find(&samples, Metric::Up, &[("island", "blue")]).is_empty());
    assert_eq!(value(&samples, Metric::Up, &[("island", "green")]), Some(1.0));
}

#[tokio::test]
async fn test_per_service_values_and_labels() {
    let svc = services("prod", 2);
    let inventory = Arc::new(FakeInventory::new().with_cluster("prod", svc.clone()));
    let factory = FakeClientFactory::new().with_tenant("blue", inventory);
    let exporter = exporter(&config(&[("blue", BLUE_ROLE)]), factory);

    let (samples, _) = exporter.scrape().await;

    let labels = [
        ("region", "eu-west-1"),
        ("island", "blue"),
        ("ecsCluster", "prod"),
        ("service", svc[1].name.as_str()),
    ];
    assert_eq!(value(&samples, Metric::ServiceDesiredTasks, &labels), Some(svc[1].desired_tasks as f64));
    assert_eq!(value(&samples, Metric::ServiceRunningTasks, &labels), Some(svc[1].running_tasks as f64));
    assert_eq!(value(&samples, Metric::ServicePendingTasks, &labels), Some(svc[1].pending_tasks as f64));
    assert_eq!(value(&samples, Metric::ServiceDeployments, &labels), Some(svc[1].deployment_count as f64));

    let sample = &find(&samples, Metric::ServiceDeployments, &labels)[0];
    assert_eq!(sample.name, "ecs_service_deployments_total");
    let keys: Vec<&str> = sample.labels.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["region", "island", "ecsCluster", "service"]);
}

#[tokio::test]
async fn test_repeated_scrapes_render_identically() {
    let blue = Arc::new(
        FakeInventory::new()
            .with_cluster("a", services("a", 17))
            .with_cluster("b", services("b", 3))
            .with_cluster("c", Vec::new()),
    );
    let green = Arc::new(FakeInventory::new().with_cluster("d", services("d", 31)));
    let factory = FakeClientFactory::new()
        .with_tenant("blue", blue)
        .with_tenant("green", green);
    let exporter = exporter(&config(&[("blue", BLUE_ROLE), ("green", GREEN_ROLE)]), factory);

    let first = exporter.render().await;
    let second = exporter.render().await;

    assert_eq!(first, second);
    assert!(first.contains("ecs_services_total{region=\"eu-west-1\",island=\"blue\",ecsCluster=\"c\"} 0"));
}

#[tokio::test]
async fn test_deadline_marks_slow_tenant_down() {
    let slow = Arc::new(
        FakeInventory::new()
            .with_cluster("slow", services("slow", 1))
            .with_latency(Duration::from_secs(30)),
    );
    let fast = Arc::new(FakeInventory::new().with_cluster("fast", services("fast", 2)));
    let factory = FakeClientFactory::new()
        .with_tenant("blue", slow)
        .with_tenant("green", fast);
    let config = ExporterConfig {
        scrape_timeout_secs: Some(1),
        ..config(&[("blue", BLUE_ROLE), ("green", GREEN_ROLE)])
    };
    let exporter = exporter(&config, factory);

    let started = std::time::Instant::now();
    let (samples, summary) = exporter.scrape().await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.timed_out, 1);
    assert_eq!(value(&samples, Metric::Up, &[("island", "blue")]), Some(0.0));
    assert_eq!(value(&samples, Metric::Up, &[("island", "green")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("ecsCluster", "fast")]), Some(2.0));
}

#[tokio::test]
async fn test_deadline_keeps_samples_already_emitted() {
    let inventory = Arc::new(
        FakeInventory::new()
            .with_cluster("prod", services("prod", 3))
            .with_service_latency(Duration::from_secs(30)),
    );
    let factory = FakeClientFactory::new().with_tenant("blue", inventory);
    let config = ExporterConfig {
        scrape_timeout_secs: Some(1),
        ..config(&[("blue", BLUE_ROLE)])
    };
    let exporter = exporter(&config, factory);

    let (samples, summary) = exporter.scrape().await;

    assert_eq!(summary.timed_out, 1);
    // up was already reported before the deadline and is not repeated
    assert_eq!(value(&samples, Metric::Up, &[("island", "blue")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ClustersTotal, &[("island", "blue")]), Some(1.0));
    assert!(find(&samples, Metric::ServicesTotal, &[]).is_empty());
}

#[tokio::test]
async fn test_deadline_aborts_running_describes() {
    let inventory = Arc::new(
        FakeInventory::new()
            .with_cluster("prod", services("prod", 25))
            .with_describe_latency(Duration::from_secs(2)),
    );
    let factory = FakeClientFactory::new().with_tenant("blue", inventory.clone());
    let config = ExporterConfig {
        scrape_timeout_secs: Some(1),
        ..config(&[("blue", BLUE_ROLE)])
    };
    let exporter = exporter(&config, factory);

    let (_, summary) = exporter.scrape().await;

    assert_eq!(summary.timed_out, 1);
    assert_eq!(inventory.calls().describe_services(), 3);
    assert_eq!(inventory.calls().describe_services_done(), 0);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(inventory.calls().describe_services_done(), 0);
    assert_eq!(inventory.calls().in_flight(), 0);
}

#[tokio::test]
async fn test_concurrency_cap_applies_across_tenants() {
    let mut factory = FakeClientFactory::new();
    let mut inventories = Vec::new();
    let mut roles = Vec::new();
    for island in ["a", "b", "c"] {
        let inventory = Arc::new(
            FakeInventory::new()
                .with_cluster(format!("{island}-1"), services(island, 20))
                .with_cluster(format!("{island}-2"), services(island, 7))
                .with_latency(Duration::from_millis(5)),
        );
        factory = factory.with_tenant(island, inventory.clone());
        inventories.push(inventory);
        roles.push((island, BLUE_ROLE));
    }
    let config = ExporterConfig {
        max_concurrent_requests: Some(3),
        page_size: 5,
        ..config(&roles)
    };
    let exporter = exporter(&config, factory);

    let (samples, summary) = exporter.scrape().await;

    assert_eq!(summary.up, 3);
    assert_eq!(find(&samples, Metric::ServiceDesiredTasks, &[]).len(), 81);
    for inventory in &inventories {
        assert!(inventory.calls().max_in_flight() <= 3);
    }
}

#[tokio::test]
async fn test_describe_lists_seven_descriptors() {
    let exporter = exporter(&config(&[]), FakeClientFactory::new());
    let names: Vec<&str> = exporter.describe().map(|d| d.name()).collect();

    assert_eq!(names.len(), 7);
    assert_eq!(names[0], "ecs_up");
    assert_eq!(names[6], "ecs_service_deployments_total");
}

#[tokio::test]
async fn test_end_to_end_over_grpc() {
    let inventory = Arc::new(
        FakeInventory::new()
            .with_cluster("prod", services("prod", 23))
            .with_vanished_cluster("gone"),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(FakeGateway::new(inventory.clone()).into_service())
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    let config = ExporterConfig {
        endpoint: format!("http://{addr}"),
        ..config(&[("blue", BLUE_ROLE)])
    };
    let factory = GrpcClientFactory::new(GrpcClientConfig::from_exporter_config(&config).unwrap());
    let exporter = Exporter::new(&config, Arc::new(factory)).unwrap();

    let text = exporter.render().await;

    assert!(text.contains("ecs_up{region=\"eu-west-1\",island=\"blue\"} 1"));
    assert!(text.contains("ecs_clusters_total{region=\"eu-west-1\",island=\"blue\"} 1"));
    assert!(text.contains("ecs_services_total{region=\"eu-west-1\",island=\"blue\",ecsCluster=\"prod\"} 23"));
    assert_eq!(inventory.calls().describe_services(), 3);

    let (samples, _) = exporter.scrape().await;
    assert_eq!(encode_text(exporter.descriptors(), &samples), text);
}

#[tokio::test]
async fn test_rejected_role_is_down_over_grpc() {
    let inventory = Arc::new(FakeInventory::new().with_cluster("prod", services("prod", 4)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(
                FakeGateway::new(inventory)
                    .with_rejected_role("roleA")
                    .into_service(),
            )
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    let config = ExporterConfig {
        endpoint: format!("http://{addr}"),
        max_retries: 0,
        ..config(&[("blue", "roleA"), ("green", "roleB")])
    };
    let factory = GrpcClientFactory::new(GrpcClientConfig::from_exporter_config(&config).unwrap());
    let exporter = Exporter::new(&config, Arc::new(factory)).unwrap();

    let (samples, summary) = exporter.scrape().await;

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.down, 1);
    assert_eq!(summary.up, 1);
    assert_eq!(value(&samples, Metric::Up, &[("island", "blue")]), Some(0.0));
    assert_eq!(find(&samples, Metric::ClustersTotal, &[("island", "blue")]).len(), 0);
    assert_eq!(value(&samples, Metric::Up, &[("island", "green")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ClustersTotal, &[("island", "green")]), Some(1.0));
    assert_eq!(value(&samples, Metric::ServicesTotal, &[("island", "green")]), Some(4.0));
    assert_eq!(find(&samples, Metric::ServiceDesiredTasks, &[("island", "green")]).len(), 4);
}
