//! Executes one page call against a [`PageStore`].
//!
//! Pipeline: normalize -> plan -> page query and count query concurrently ->
//! assemble. Validation and cursor errors surface before the store is
//! touched. Cancellation and the deadline cover both store calls; when either
//! fires, the call fails and no page is produced.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keyset_core::{
    assemble, normalize, plan_count, plan_page, BaseFilter, Collection, PageError, PageRequest,
    PageResult, PaginationConfig, Row, RowError, StoreStage,
};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::traits::PageStore;

/// Per-call cancellation and deadline.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub cancel: CancellationToken,
    pub deadline: Option<Duration>,
}

impl PageContext {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Generic keyset paginator shared by every list type.
///
/// Holds only configuration and the injected store.
#[derive(Clone)]
pub struct Paginator {
    store: Arc<dyn PageStore>,
    config: PaginationConfig,
}

fn outcome<T>(result: &Result<T, PageError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_client_error() => "invalid",
        Err(PageError::Cancelled) => "cancelled",
        Err(PageError::DeadlineExceeded { .. }) => "deadline",
        Err(_) => "error",
    }
}

impl Paginator {
    #[must_use]
    pub fn new(store: Arc<dyn PageStore>, config: PaginationConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Returns one page of `collection` restricted by `base`.
    ///
    /// `map` turns each stored row into the caller's node type.
    ///
    /// # Errors
    ///
    /// Any [`PageError`]; see the variant docs. No partial page is returned.
    pub async fn paginate<T, F>(
        &self,
        collection: &Collection,
        base: &BaseFilter,
        request: &PageRequest,
        ctx: &PageContext,
        map: F,
    ) -> Result<PageResult<T>, PageError>
    where
        T: Clone,
        F: FnMut(&Row) -> Result<T, RowError>,
    {
        let span = info_span!(
            "paginate",
            collection = collection.name,
            direction = tracing::field::Empty,
            limit = tracing::field::Empty,
            rows = tracing::field::Empty,
            total = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.run(collection, base, request, ctx, map).await;
            let elapsed = start.elapsed();

            let outcome = outcome(&result);
            let span = tracing::Span::current();
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            span.record("duration_ms", duration_ms);
            span.record("outcome", outcome);
            if let Ok(page) = &result {
                span.record("rows", page.edges.len());
                span.record("total", page.total_count);
            }

            metrics::counter!(
                "keyset_page_requests_total",
                "collection" => collection.name,
                "outcome" => outcome
            )
            .increment(1);
            metrics::histogram!("keyset_page_duration_ms", "collection" => collection.name)
                .record(elapsed.as_secs_f64() * 1000.0);

            result
        }
        .instrument(span)
        .await
    }

    async fn run<T, F>(
        &self,
        collection: &Collection,
        base: &BaseFilter,
        request: &PageRequest,
        ctx: &PageContext,
        map: F,
    ) -> Result<PageResult<T>, PageError>
    where
        T: Clone,
        F: FnMut(&Row) -> Result<T, RowError>,
    {
        let normalized = normalize(request, &collection.descriptor, &self.config)?;
        let span = tracing::Span::current();
        span.record("direction", normalized.direction.as_str());
        span.record("limit", normalized.limit);

        let plan = plan_page(collection, base, &normalized);
        let count = plan_count(collection, base);
        let store = &self.store;

        let (rows, total) = guarded(ctx, async {
            tokio::try_join!(
                async {
                    store
                        .query(&plan)
                        .await
                        .map_err(|source| store_error(StoreStage::Page, source))
                },
                async {
                    store
                        .count(&count)
                        .await
                        .map_err(|source| store_error(StoreStage::Count, source))
                },
            )
        })
        .await?;

        assemble(&collection.descriptor, &normalized, rows, total, map)
    }
}

fn store_error(stage: StoreStage, source: anyhow::Error) -> PageError {
    warn!(stage = stage.as_str(), error = %source, "store call failed");
    PageError::Store { stage, source }
}

/// Runs `work` under the context's deadline, racing it against cancellation.
async fn guarded<R, W>(ctx: &PageContext, work: W) -> Result<R, PageError>
where
    W: Future<Output = Result<R, PageError>>,
{
    let bounded = async {
        match ctx.deadline {
            Some(deadline) => tokio::time::timeout(deadline, work)
                .await
                .map_err(|_elapsed| PageError::DeadlineExceeded {
                    timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => work.await,
        }
    };

    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => Err(PageError::Cancelled),
        result = bounded => result,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use keyset_core::{
        CountQuery, Predicate, QueryPlan, SortDirection, SortKeyDescriptor, ValidationError,
        Value,
    };
    use proptest::prelude::*;

    use super::*;
    use crate::storage::MemoryStore;
    use crate::traits::RowSink;

    fn numbers() -> Collection {
        Collection {
            name: "numbers",
            table: "numbers",
            columns: &[],
            descriptor: SortKeyDescriptor::scalar("id", SortDirection::Desc),
        }
    }

    fn events() -> Collection {
        Collection {
            name: "events",
            table: "events",
            columns: &[],
            descriptor: SortKeyDescriptor::timestamp_and_bytes("at", "key", SortDirection::Desc),
        }
    }

    async fn store_with(ids: &[i64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for id in ids {
            store
                .upsert("numbers", "id", Row::new().with("id", *id))
                .await
                .unwrap();
        }
        store
    }

    fn paginator(store: Arc<dyn PageStore>) -> Paginator {
        Paginator::new(store, PaginationConfig::default())
    }

    fn id(row: &Row) -> Result<i64, RowError> {
        row.int("id")
    }

    fn event_key(row: &Row) -> Result<(i64, u8), RowError> {
        Ok((row.timestamp("at")?, row.bytes("key")?[0]))
    }

    async fn page(p: &Paginator, request: PageRequest) -> Result<PageResult<i64>, PageError> {
        p.paginate(&numbers(), &BaseFilter::none(), &request, &PageContext::default(), id)
            .await
    }

    #[tokio::test]
    async fn first_and_last_never_reaches_the_store() {
        let store = store_with(&[1, 2, 3]).await;
        let p = paginator(store.clone());

        let request = PageRequest {
            first: Some(1),
            last: Some(1),
            ..PageRequest::default()
        };
        let err = page(&p, request).await.unwrap_err();
        assert!(matches!(err, PageError::Validation(ValidationError::FirstAndLast)));

        let err = page(&p, PageRequest::first(1).after("%%%")).await.unwrap_err();
        assert!(err.is_client_error());

        assert_eq!(store.query_calls(), 0);
        assert_eq!(store.count_calls(), 0);
    }

    #[tokio::test]
    async fn forward_pages_walk_the_collection() {
        let p = paginator(store_with(&[1, 2, 3, 4, 5]).await);

        let first = page(&p, PageRequest::first(2)).await.unwrap();
        assert_eq!(first.nodes, vec![5, 4]);
        assert!(first.page_info.has_next_page);
        assert!(!first.page_info.has_previous_page);
        assert_eq!(first.total_count, 5);

        let cursor = first.page_info.end_cursor.unwrap();
        let second = page(&p, PageRequest::first(2).after(cursor)).await.unwrap();
        assert_eq!(second.nodes, vec![3, 2]);
        assert!(second.page_info.has_next_page);
        assert!(second.page_info.has_previous_page);
        assert_eq!(second.total_count, 5);
    }

    #[tokio::test]
    async fn exact_fit_page_has_no_next() {
        let p = paginator(store_with(&[1, 2, 3]).await);
        let page = page(&p, PageRequest::first(3)).await.unwrap();
        assert_eq!(page.nodes, vec![3, 2, 1]);
        assert!(!page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn backward_page_before_the_tail() {
        let p = paginator(store_with(&[1, 2, 3, 4]).await);
        let cursor = numbers()
            .descriptor
            .encode(&keyset_core::SortKey::new(vec![Value::Int(1)]))
            .unwrap();

        let page = page(&p, PageRequest::last(2).before(cursor)).await.unwrap();
        assert_eq!(page.nodes, vec![3, 2]);
        assert!(page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn last_without_cursor_returns_the_tail() {
        let p = paginator(store_with(&[1, 2, 3, 4]).await);
        let page = page(&p, PageRequest::last(3)).await.unwrap();
        assert_eq!(page.nodes, vec![3, 2, 1]);
        assert!(!page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn empty_collection() {
        let p = paginator(store_with(&[]).await);
        let page = page(&p, PageRequest::first(10)).await.unwrap();
        assert!(page.edges.is_empty());
        assert_eq!(page.page_info.start_cursor, None);
        assert_eq!(page.page_info.end_cursor, None);
        assert!(!page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let p = paginator(store_with(&[7, 8, 9]).await);
        let a = page(&p, PageRequest::first(2)).await.unwrap();
        let b = page(&p, PageRequest::first(2)).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn composite_keys_break_ties_on_the_unique_field() {
        let store = Arc::new(MemoryStore::new());
        for (at, key) in [(10, 1u8), (10, 2), (10, 3), (5, 4)] {
            store.append(
                "events",
                Row::new().with("at", Value::Timestamp(at)).with("key", vec![key]),
            );
        }
        let p = paginator(store);
        let ctx = PageContext::default();
        let base = BaseFilter::none();

        let first = p
            .paginate(&events(), &base, &PageRequest::first(2), &ctx, event_key)
            .await
            .unwrap();
        assert_eq!(first.nodes, vec![(10, 3), (10, 2)]);

        let after = first.page_info.end_cursor.clone().unwrap();
        let second = p
            .paginate(&events(), &base, &PageRequest::first(2).after(after), &ctx, event_key)
            .await
            .unwrap();
        assert_eq!(second.nodes, vec![(10, 1), (5, 4)]);
        assert!(!second.page_info.has_next_page);

        let before = second.page_info.start_cursor.unwrap();
        let back = p
            .paginate(&events(), &base, &PageRequest::last(2).before(before), &ctx, event_key)
            .await
            .unwrap();
        assert_eq!(back.nodes, first.nodes);
    }

    #[tokio::test]
    async fn distinct_count_over_a_multiplying_relation() {
        let store = store_with(&[1, 2, 3]).await;
        // vehicle 1 has two grants for the same grantee
        for (token, privilege) in [(1, 1), (1, 2), (3, 1)] {
            store.append(
                "grants",
                Row::new()
                    .with("token_id", token)
                    .with("privilege_id", privilege)
                    .with("grantee", vec![0xaau8]),
            );
        }
        let base = BaseFilter::new(Predicate::related(
            "grants",
            "id",
            "token_id",
            Predicate::equals("grantee", vec![0xaau8]),
        ))
        .distinct();

        let p = paginator(store);
        let page = p
            .paginate(&numbers(), &base, &PageRequest::first(10), &PageContext::default(), id)
            .await
            .unwrap();
        assert_eq!(page.nodes, vec![3, 1]);
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn oversize_request_is_clamped() {
        let store = store_with(&(1..=5).collect::<Vec<_>>()).await;
        let p = Paginator::new(
            store,
            PaginationConfig {
                max_page_size: 2,
                default_page_size: 2,
            },
        );
        let page = page(&p, PageRequest::first(1_000)).await.unwrap();
        assert_eq!(page.nodes.len(), 2);
        assert!(page.page_info.has_next_page);
    }

    /// Store whose calls never finish in test time.
    struct StalledStore;

    #[async_trait]
    impl PageStore for StalledStore {
        async fn query(&self, _plan: &QueryPlan) -> anyhow::Result<Vec<Row>> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(Vec::new())
        }

        async fn count(&self, _query: &CountQuery) -> anyhow::Result<u64> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_the_call() {
        let p = paginator(Arc::new(StalledStore));
        let ctx = PageContext::default().with_deadline(Duration::from_millis(250));
        let err = p
            .paginate(&numbers(), &BaseFilter::none(), &PageRequest::first(1), &ctx, id)
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::DeadlineExceeded { timeout_ms: 250 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_fails_the_call() {
        let p = paginator(Arc::new(StalledStore));
        let cancel = CancellationToken::new();
        let ctx = PageContext::new(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let err = p
            .paginate(&numbers(), &BaseFilter::none(), &PageRequest::first(1), &ctx, id)
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Cancelled));
        trigger.await.unwrap();
    }

    /// Store that fails one of its two calls.
    struct FailingStore(StoreStage);

    #[async_trait]
    impl PageStore for FailingStore {
        async fn query(&self, _plan: &QueryPlan) -> anyhow::Result<Vec<Row>> {
            match self.0 {
                StoreStage::Page => anyhow::bail!("page backend down"),
                StoreStage::Count => Ok(Vec::new()),
            }
        }

        async fn count(&self, _query: &CountQuery) -> anyhow::Result<u64> {
            match self.0 {
                StoreStage::Count => anyhow::bail!("count backend down"),
                StoreStage::Page => Ok(0),
            }
        }
    }

    #[tokio::test]
    async fn store_failure_names_the_stage() {
        for stage in [StoreStage::Page, StoreStage::Count] {
            let p = paginator(Arc::new(FailingStore(stage)));
            let err = page(&p, PageRequest::first(1)).await.unwrap_err();
            match err {
                PageError::Store { stage: failed, .. } => assert_eq!(failed, stage),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn unmappable_row_fails_the_page() {
        let store = Arc::new(MemoryStore::new());
        store.append("numbers", Row::new().with("id", "not a number"));
        let err = page(&paginator(store), PageRequest::first(1)).await.unwrap_err();
        assert!(matches!(err, PageError::Row(RowError::WrongKind { .. })));
    }

    // ---- Against a sorted reference ----

    fn walk(rows: &[(i64, u8)], size: i64, forward: bool) -> (Vec<(i64, u8)>, u64) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            for (at, key) in rows {
                store.append(
                    "events",
                    Row::new().with("at", Value::Timestamp(*at)).with("key", vec![*key]),
                );
            }
            let p = paginator(store);
            let ctx = PageContext::default();
            let base = BaseFilter::none();

            let mut seen = Vec::new();
            let mut cursor: Option<String> = None;
            let mut total = 0;
            loop {
                let request = match (forward, cursor.take()) {
                    (true, None) => PageRequest::first(size),
                    (true, Some(c)) => PageRequest::first(size).after(c),
                    (false, None) => PageRequest::last(size),
                    (false, Some(c)) => PageRequest::last(size).before(c),
                };
                let page = p
                    .paginate(&events(), &base, &request, &ctx, event_key)
                    .await
                    .unwrap();
                total = page.total_count;
                let more = if forward {
                    seen.extend(page.nodes);
                    cursor = page.page_info.end_cursor;
                    page.page_info.has_next_page
                } else {
                    let mut nodes = page.nodes;
                    nodes.extend(seen);
                    seen = nodes;
                    cursor = page.page_info.start_cursor;
                    page.page_info.has_previous_page
                };
                if !more {
                    break;
                }
            }
            (seen, total)
        })
    }

    proptest! {
        #[test]
        fn paging_visits_every_row_once_in_order(
            keys in proptest::collection::btree_set(any::<u8>(), 0..40),
            stamps in proptest::collection::vec(0i64..4, 40),
            size in 1i64..7,
        ) {
            let rows: Vec<(i64, u8)> = keys.iter().zip(&stamps).map(|(k, at)| (*at, *k)).collect();
            let mut expected = rows.clone();
            expected.sort_by(|a, b| b.cmp(a));

            let (forward, total) = walk(&rows, size, true);
            prop_assert_eq!(&forward, &expected);
            prop_assert_eq!(total, rows.len() as u64);

            let (backward, _) = walk(&rows, size, false);
            prop_assert_eq!(&backward, &expected);

            let unique: BTreeSet<_> = forward.iter().collect();
            prop_assert_eq!(unique.len(), forward.len());
        }
    }
}
