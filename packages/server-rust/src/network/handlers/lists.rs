//! `GET /v1/...` list endpoints.
//!
//! Each endpoint takes the connection arguments (`first`, `after`, `last`,
//! `before`) plus its own filters as query parameters and answers with a
//! JSON connection page.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyset_core::{PageError, PageRequest, PageResult, ValidationError};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::service::domain::{
    Address, AftermarketDevice, AftermarketDeviceFilter, Privilege, PrivilegeFilter, Reward,
    RewardFilter, Stake, StakeFilter, Vehicle, VehicleFilter,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body: `{"error": <kind>, "message": <text>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed query string or path.
    #[error("{0}")]
    Request(String),
    #[error(transparent)]
    Page(#[from] PageError),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Request(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Page(e) => match e {
                PageError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
                PageError::CursorDecode { .. } => (StatusCode::BAD_REQUEST, "invalid_cursor"),
                PageError::DeadlineExceeded { .. } => {
                    (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded")
                }
                PageError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
                PageError::Store { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
                PageError::Row(_) => (StatusCode::INTERNAL_SERVER_ERROR, "row_error"),
            },
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Page(e.into())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::Request(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        Self::Request(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match &self {
            Self::Request(message) => message.clone(),
            // store and row details stay in the logs
            Self::Page(e) if status.is_server_error() && !matches!(e, PageError::Cancelled) => {
                tracing::error!(error = %e, "list request failed");
                "internal error".to_string()
            }
            Self::Page(e) => e.to_string(),
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<PageResult<T>>, ApiError>;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Declares a query-argument struct carrying the connection arguments plus
/// the listed filter fields.
macro_rules! list_args {
    (
        $(#[$meta:meta])*
        $name:ident { $($field:ident : $ty:ty),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            pub first: Option<i64>,
            pub after: Option<String>,
            pub last: Option<i64>,
            pub before: Option<String>,
            $(pub $field: $ty,)*
        }

        impl $name {
            fn page_request(&self) -> PageRequest {
                PageRequest {
                    first: self.first,
                    after: self.after.clone(),
                    last: self.last,
                    before: self.before.clone(),
                }
            }
        }
    };
}

list_args!(
    /// `/v1/vehicles`
    VehicleArgs {
        owner: Option<String>,
        privileged: Option<String>,
        manufacturer_id: Option<i64>,
    }
);

list_args!(
    /// `/v1/aftermarket-devices`
    AftermarketDeviceArgs {
        owner: Option<String>,
        manufacturer_id: Option<i64>,
    }
);

list_args!(
    /// `/v1/vehicles/{tokenId}/privileges`
    PrivilegeArgs { grantee: Option<String> }
);

list_args!(
    /// `/v1/stakes`
    StakeArgs {
        owner: Option<String>,
        vehicle_id: Option<i64>,
    }
);

list_args!(
    /// `/v1/rewards`
    RewardArgs {
        user: Option<String>,
        vehicle_id: Option<i64>,
    }
);

fn address(argument: &'static str, value: Option<&str>) -> Result<Option<Address>, ValidationError> {
    value.map(|v| Address::parse(argument, v)).transpose()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn list_vehicles(
    State(state): State<AppState>,
    args: Result<Query<VehicleArgs>, QueryRejection>,
) -> ApiResult<Vehicle> {
    let Query(args) = args?;
    let filter = VehicleFilter {
        owner: address("owner", args.owner.as_deref())?,
        privileged: address("privileged", args.privileged.as_deref())?,
        manufacturer_id: args.manufacturer_id,
    };
    let page = state
        .lists
        .vehicles(&filter, &args.page_request(), state.shutdown.request_token())
        .await?;
    Ok(Json(page))
}

pub async fn list_aftermarket_devices(
    State(state): State<AppState>,
    args: Result<Query<AftermarketDeviceArgs>, QueryRejection>,
) -> ApiResult<AftermarketDevice> {
    let Query(args) = args?;
    let filter = AftermarketDeviceFilter {
        owner: address("owner", args.owner.as_deref())?,
        manufacturer_id: args.manufacturer_id,
    };
    let page = state
        .lists
        .aftermarket_devices(&filter, &args.page_request(), state.shutdown.request_token())
        .await?;
    Ok(Json(page))
}

pub async fn list_privileges(
    State(state): State<AppState>,
    token_id: Result<Path<i64>, PathRejection>,
    args: Result<Query<PrivilegeArgs>, QueryRejection>,
) -> ApiResult<Privilege> {
    let Path(token_id) = token_id?;
    let Query(args) = args?;
    let filter = PrivilegeFilter {
        token_id,
        grantee: address("grantee", args.grantee.as_deref())?,
    };
    let page = state
        .lists
        .privileges(&filter, &args.page_request(), state.shutdown.request_token())
        .await?;
    Ok(Json(page))
}

pub async fn list_stakes(
    State(state): State<AppState>,
    args: Result<Query<StakeArgs>, QueryRejection>,
) -> ApiResult<Stake> {
    let Query(args) = args?;
    let filter = StakeFilter {
        owner: address("owner", args.owner.as_deref())?,
        vehicle_id: args.vehicle_id,
    };
    let page = state
        .lists
        .stakes(&filter, &args.page_request(), state.shutdown.request_token())
        .await?;
    Ok(Json(page))
}

pub async fn list_rewards(
    State(state): State<AppState>,
    args: Result<Query<RewardArgs>, QueryRejection>,
) -> ApiResult<Reward> {
    let Query(args) = args?;
    let filter = RewardFilter {
        user: address("user", args.user.as_deref())?,
        vehicle_id: args.vehicle_id,
    };
    let page = state
        .lists
        .rewards(&filter, &args.page_request(), state.shutdown.request_token())
        .await?;
    Ok(Json(page))
}
