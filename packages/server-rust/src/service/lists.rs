//! One entry point per list type, shared by every transport.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use keyset_core::{PageError, PageRequest, PageResult};
use tokio_util::sync::CancellationToken;

use crate::service::config::ServiceConfig;
use crate::service::domain::{
    aftermarket, privileges, rewards, stakes, vehicles, AftermarketDevice,
    AftermarketDeviceFilter, Privilege, PrivilegeFilter, Reward, RewardFilter, Stake, StakeFilter,
    Vehicle, VehicleFilter,
};
use crate::service::paginator::{PageContext, Paginator};
use crate::traits::PageStore;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Paginated listings over one store.
#[derive(Clone)]
pub struct ListService {
    paginator: Paginator,
    query_timeout: Option<Duration>,
}

impl ListService {
    #[must_use]
    pub fn new(store: Arc<dyn PageStore>, config: &ServiceConfig) -> Self {
        Self {
            paginator: Paginator::new(store, config.pagination.clone()),
            query_timeout: (config.query_timeout_ms > 0)
                .then(|| Duration::from_millis(config.query_timeout_ms)),
        }
    }

    fn context(&self, cancel: CancellationToken) -> PageContext {
        let ctx = PageContext::new(cancel);
        match self.query_timeout {
            Some(deadline) => ctx.with_deadline(deadline),
            None => ctx,
        }
    }

    /// # Errors
    ///
    /// See [`Paginator::paginate`].
    pub async fn vehicles(
        &self,
        filter: &VehicleFilter,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<PageResult<Vehicle>, PageError> {
        self.paginator
            .paginate(
                &vehicles::collection(),
                &filter.base_filter(now_ms()),
                request,
                &self.context(cancel),
                Vehicle::from_row,
            )
            .await
    }

    /// # Errors
    ///
    /// See [`Paginator::paginate`].
    pub async fn aftermarket_devices(
        &self,
        filter: &AftermarketDeviceFilter,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<PageResult<AftermarketDevice>, PageError> {
        self.paginator
            .paginate(
                &aftermarket::collection(),
                &filter.base_filter(),
                request,
                &self.context(cancel),
                AftermarketDevice::from_row,
            )
            .await
    }

    /// # Errors
    ///
    /// See [`Paginator::paginate`].
    pub async fn privileges(
        &self,
        filter: &PrivilegeFilter,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<PageResult<Privilege>, PageError> {
        self.paginator
            .paginate(
                &privileges::collection(),
                &filter.base_filter(),
                request,
                &self.context(cancel),
                Privilege::from_row,
            )
            .await
    }

    /// # Errors
    ///
    /// See [`Paginator::paginate`].
    pub async fn stakes(
        &self,
        filter: &StakeFilter,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<PageResult<Stake>, PageError> {
        self.paginator
            .paginate(
                &stakes::collection(),
                &filter.base_filter(),
                request,
                &self.context(cancel),
                Stake::from_row,
            )
            .await
    }

    /// # Errors
    ///
    /// See [`Paginator::paginate`].
    pub async fn rewards(
        &self,
        filter: &RewardFilter,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<PageResult<Reward>, PageError> {
        self.paginator
            .paginate(
                &rewards::collection(),
                &filter.base_filter(),
                request,
                &self.context(cancel),
                Reward::from_row,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use keyset_core::{Row, Value};

    use super::*;
    use crate::service::domain::fixtures::address;
    use crate::storage::MemoryStore;
    use crate::traits::RowSink;

    const FAR_FUTURE: i64 = 32_503_680_000_000;

    async fn vehicle(store: &MemoryStore, id: i64, owner: u8) {
        store
            .upsert(
                vehicles::TABLE,
                vehicles::KEY,
                Row::new()
                    .with("id", id)
                    .with("owner", address(owner))
                    .with("minted_at", Value::Timestamp(id)),
            )
            .await
            .unwrap();
    }

    async fn grant(store: &MemoryStore, token: i64, privilege: i64, grantee: u8, expires_at: i64) {
        store
            .upsert(
                privileges::TABLE,
                privileges::KEY,
                Row::new()
                    .with(
                        "grant_id",
                        privileges::grant_id(token, privilege, &address(grantee)),
                    )
                    .with("token_id", token)
                    .with("privilege_id", privilege)
                    .with("grantee", address(grantee))
                    .with("set_at", Value::Timestamp(100))
                    .with("expires_at", Value::Timestamp(expires_at)),
            )
            .await
            .unwrap();
    }

    fn service(store: Arc<MemoryStore>) -> ListService {
        ListService::new(store, &ServiceConfig::default())
    }

    #[tokio::test]
    async fn vehicles_by_owner() {
        let store = Arc::new(MemoryStore::new());
        for (id, owner) in [(1, 1), (2, 2), (3, 1)] {
            vehicle(&store, id, owner).await;
        }
        let filter = VehicleFilter {
            owner: Some(address(1)),
            ..VehicleFilter::default()
        };
        let page = service(store)
            .vehicles(&filter, &PageRequest::first(10), CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<i64> = page.nodes.iter().map(|v| v.token_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn privileged_vehicles_skip_expired_grants_and_count_distinct() {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=3 {
            vehicle(&store, id, 1).await;
        }
        grant(&store, 1, 1, 9, FAR_FUTURE).await;
        grant(&store, 1, 4, 9, FAR_FUTURE).await;
        grant(&store, 2, 1, 9, 1).await;
        grant(&store, 3, 1, 8, FAR_FUTURE).await;

        let filter = VehicleFilter {
            privileged: Some(address(9)),
            ..VehicleFilter::default()
        };
        let page = service(store)
            .vehicles(&filter, &PageRequest::first(10), CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<i64> = page.nodes.iter().map(|v| v.token_id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn privileges_page_through_shared_timestamps() {
        let store = Arc::new(MemoryStore::new());
        for privilege in 1..=5 {
            grant(&store, 7, privilege, 3, FAR_FUTURE).await;
        }
        grant(&store, 8, 1, 3, FAR_FUTURE).await;
        let svc = service(store);
        let filter = PrivilegeFilter::new(7);

        let first = svc
            .privileges(&filter, &PageRequest::first(3), CancellationToken::new())
            .await
            .unwrap();
        let after = first.page_info.end_cursor.clone().unwrap();
        let second = svc
            .privileges(&filter, &PageRequest::first(3).after(after), CancellationToken::new())
            .await
            .unwrap();

        let seen: Vec<i64> = first
            .nodes
            .iter()
            .chain(&second.nodes)
            .map(|p| p.privilege_id)
            .collect();
        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
        assert!(!second.page_info.has_next_page);
        assert_eq!(second.total_count, 5);
    }

    #[tokio::test]
    async fn cursor_from_another_list_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        vehicle(&store, 1, 1).await;
        let svc = service(store);

        let vehicles = svc
            .vehicles(&VehicleFilter::default(), &PageRequest::first(1), CancellationToken::new())
            .await
            .unwrap();
        let scalar = vehicles.page_info.end_cursor.unwrap();

        let err = svc
            .rewards(
                &RewardFilter::default(),
                &PageRequest::first(1).after(scalar),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn cancelled_token_fails_before_any_page() {
        let svc = service(Arc::new(MemoryStore::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = svc
            .stakes(&StakeFilter::default(), &PageRequest::first(1), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Cancelled));
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let config = ServiceConfig {
            query_timeout_ms: 0,
            ..ServiceConfig::default()
        };
        let svc = ListService::new(Arc::new(MemoryStore::new()), &config);
        assert_eq!(svc.context(CancellationToken::new()).deadline, None);
    }
}
