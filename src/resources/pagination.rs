// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::future::Future;

use crate::client::Page;
use crate::error::{ExporterError, Result};

/// Collect every identifier of a paginated list operation.
///
/// `list` is called with `page_bound` and the cursor of the previous page,
/// starting with `None`, until a page comes back without a cursor. The first
/// failing call aborts the whole listing and nothing collected so far is
/// returned.
///
/// A server handing out a cursor it already returned would loop forever, so
/// that is reported as an `UpstreamList` error for `operation`.
pub async fn list_all<F, Fut>(operation: &'static str, page_bound: u32, mut list: F) -> Result<Vec<String>>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    let mut ids = Vec::new();
    let mut seen_cursors = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = list(page_bound, cursor.take()).await?;
        ids.extend(page.ids.iter().cloned());

        match page.continuation() {
            None => return Ok(ids),
            Some(next) if !seen_cursors.insert(next.to_string()) => {
                return Err(ExporterError::list(
                    operation,
                    tonic::Status::internal(format!("pagination cursor '{next}' repeated")),
                ));
            }
            Some(next) => cursor = Some(next.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn paged_source(total: usize) -> Vec<String> {
        (0..total).map(|i| format!("arn:aws:ecs:eu-west-1:0:cluster/c{i:03}")).collect()
    }

    async fn list_source(source: &[String], bound: u32, cursor: Option<String>) -> Result<Page> {
        let offset: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let end = (offset + bound as usize).min(source.len());
        let ids = source[offset..end].to_vec();
        Ok(if end < source.len() {
            Page::more(ids, end.to_string())
        } else {
            Page::last(ids)
        })
    }

    #[tokio::test]
    async fn test_issues_ceil_k_over_n_calls() {
        for (total, bound, expected_calls) in [(0, 10, 1), (10, 10, 1), (11, 10, 2), (25, 10, 3), (7, 3, 3)] {
            let source = paged_source(total);
            let calls = AtomicUsize::new(0);

            let ids = list_all("ListClusters", bound, |bound, cursor| {
                calls.fetch_add(1, Ordering::SeqCst);
                list_source(&source, bound, cursor)
            })
            .await
            .unwrap();

            assert_eq!(ids, source, "total={total} bound={bound}");
            assert_eq!(calls.load(Ordering::SeqCst), expected_calls, "total={total} bound={bound}");
            let unique: HashSet<_> = ids.iter().collect();
            assert_eq!(unique.len(), total);
        }
    }

    #[tokio::test]
    async fn test_empty_cursor_ends_listing() {
        let calls = AtomicUsize::new(0);
        let ids = list_all("ListServices", 10, |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Page::more(vec!["a".to_string()], "")) }
        })
        .await
        .unwrap();

        assert_eq!(ids, vec!["a".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_discards_collected_pages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = list_all("ListServices", 2, |_, cursor| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match cursor {
                    None => Ok(Page::more(vec!["a".to_string(), "b".to_string()], "2")),
                    Some(_) => Err(ExporterError::list(
                        "ListServices",
                        tonic::Status::unavailable(format!("call {n} throttled")),
                    )),
                }
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(ExporterError::UpstreamList { operation: "ListServices", .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_an_error() {
        let result = list_all("ListClusters", 10, |_, _| async {
            Ok(Page::more(vec!["a".to_string()], "same"))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.upstream_status().map(|s| s.code()), Some(tonic::Code::Internal));
    }
}
