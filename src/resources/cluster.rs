// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::debug;

use super::{list_all, partition, Cluster, ScanOptions};
use crate::client::ClientHandle;
use crate::error::Result;

/// List and describe every cluster visible to `client`.
///
/// An empty listing returns no clusters without a describe call. Clusters the
/// describe call leaves out (deleted in between) are simply absent. Any failed
/// call fails the whole enumeration.
pub async fn enumerate_clusters(client: &ClientHandle, options: &ScanOptions) -> Result<Vec<Cluster>> {
    let ids = list_all("ListClusters", options.page_bound, |bound, cursor| {
        let client = client.clone();
        let limit = options.limit.clone();
        async move {
            let _permit = limit.acquire().await;
            client.list_clusters(bound, cursor.as_deref()).await
        }
    })
    .await?;

    debug!("got {} cluster ids", ids.len());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let listed = ids.len();
    let chunks = if options.chunk_cluster_describes {
        partition(ids, options.batch_size())
    } else {
        vec![ids]
    };

    let mut clusters = Vec::with_capacity(listed);
    for chunk in &chunks {
        let _permit = options.limit.acquire().await;
        clusters.extend(client.describe_clusters(chunk).await?);
    }

    debug!("described {} of {} clusters", clusters.len(), listed);
    Ok(clusters)
}
