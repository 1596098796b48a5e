//! Persistence seam. The store is the single source of truth; every committed write is
//! published on the change feed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::request::{Request, RequestId, RequestStatus, RequestType};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("request store unavailable: {0}")]
    Unavailable(String),
    #[error("request `{id}` changed concurrently (expected version {expected}, found {actual})")]
    Conflict { id: RequestId, expected: u32, actual: u32 },
    #[error("request `{0}` not found")]
    NotFound(RequestId),
    #[error("request `{0}` already exists")]
    Duplicate(RequestId),
}

/// Equality and membership filters; empty lists match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub statuses: Vec<RequestStatus>,
    pub types: Vec<RequestType>,
    pub requester_ids: Vec<String>,
    pub executive_id: Option<String>,
}

impl RequestFilter {
    pub fn for_requester(employee_id: impl Into<String>) -> Self {
        Self { requester_ids: vec![employee_id.into()], ..Self::default() }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = RequestType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = RequestStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn matches(&self, request: &Request) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&request.status))
            && (self.types.is_empty() || self.types.contains(&request.request_type))
            && (self.requester_ids.is_empty()
                || self.requester_ids.contains(&request.requester.employee_id))
            && self
                .executive_id
                .as_ref()
                .map_or(true, |executive| request.executive_id.as_ref() == Some(executive))
    }
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError>;
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError>;
    async fn insert(&self, request: &Request) -> Result<Request, StoreError>;
    /// Writes `request` only if the stored version still equals `expected_version`.
    /// Returns the stored request with its bumped version.
    async fn save_transition(
        &self,
        request: &Request,
        expected_version: u32,
    ) -> Result<Request, StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestChange {
    pub kind: ChangeKind,
    pub request: Request,
}

pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<RequestChange>;
}
