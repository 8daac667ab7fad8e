// SPDX-License-Identifier: MIT OR Apache-2.0

use tokio::task::JoinSet;
use tracing::debug;

use super::{list_all, Cluster, ScanOptions, Service};
use crate::client::ClientHandle;
use crate::error::{ExporterError, Result};

/// Split `ids` into consecutive batches of at most `size` identifiers.
///
/// Zero identifiers give zero batches.
#[must_use]
pub fn partition(ids: Vec<String>, size: usize) -> Vec<Vec<String>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(ids.len().div_ceil(size));
    let mut ids = ids.into_iter().peekable();
    while ids.peek().is_some() {
        batches.push(ids.by_ref().take(size).collect());
    }
    batches
}

/// List the services of `cluster` and describe them in concurrent batches.
///
/// One task is spawned per batch of `page_bound` identifiers into a
/// [`JoinSet`] owned by this call, so dropping the returned future aborts
/// every batch still running.
///
/// All batch results are drained before returning. If any batch failed the
/// result is [`ExporterError::PartialBatch`] naming the lowest failed batch,
/// and the services described by the other batches are dropped.
pub async fn enumerate_services(
    client: &ClientHandle,
    cluster: &Cluster,
    options: &ScanOptions,
) -> Result<Vec<Service>> {
    let ids = list_all("ListServices", options.page_bound, |bound, cursor| {
        let client = client.clone();
        let limit = options.limit.clone();
        let cluster_id = cluster.id.clone();
        async move {
            let _permit = limit.acquire().await;
            client.list_services(&cluster_id, bound, cursor.as_deref()).await
        }
    })
    .await?;

    debug!("got {} services on the {} cluster", ids.len(), cluster.name);

    let service_count = ids.len();
    let batches = partition(ids, options.batch_size());
    let total = batches.len();

    let mut tasks = JoinSet::new();
    for (index, batch) in batches.into_iter().enumerate() {
        let client = client.clone();
        let limit = options.limit.clone();
        let cluster_id = cluster.id.clone();
        tasks.spawn(async move {
            let _permit = limit.acquire().await;
            (index, client.describe_services(&cluster_id, &batch).await)
        });
    }

    let mut services = Vec::with_capacity(service_count);
    let mut failure: Option<(usize, ExporterError)> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(described))) => services.extend(described),
            Ok((index, Err(source))) => {
                if failure.as_ref().is_none_or(|(first, _)| index < *first) {
                    failure = Some((index, source));
                }
            }
            Err(e) => {
                return Err(ExporterError::Unknown(format!(
                    "describe task on cluster '{}' did not complete: {e}",
                    cluster.name
                )));
            }
        }
    }

    if let Some((index, source)) = failure {
        return Err(ExporterError::PartialBatch {
            cluster: cluster.name.clone(),
            batch: index + 1,
            total,
            source: Box::new(source),
        });
    }
    Ok(services)
}
