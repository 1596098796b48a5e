use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::action::{Actor, Role};
use crate::domain::request::{
    Request, RequestId, RequestStatus, RequestType, Requester, SignatureImage,
};
use crate::store::{RequestFilter, RequestStore, StoreError};

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

pub(crate) fn minutes_after_base(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

pub(crate) fn request(
    id: &str,
    employee_id: &str,
    request_type: RequestType,
    status: RequestStatus,
) -> Request {
    Request {
        id: RequestId(id.to_owned()),
        request_type,
        status,
        requester: Requester {
            employee_id: employee_id.to_owned(),
            name: format!("Employee {employee_id}"),
            department: "Operations".to_owned(),
            contact: Some(format!("line:{employee_id}")),
        },
        title: None,
        amount: Decimal::new(5_000, 0),
        excess_amount: Decimal::ZERO,
        payment_split: None,
        waiver: None,
        children: None,
        funeral_type: None,
        executive_id: None,
        manager_id: None,
        requester_signature: Some(SignatureImage(format!("sig:{employee_id}"))),
        stamps: BTreeMap::new(),
        revision_count: 0,
        version: 1,
        created_at: base_time(),
        updated_at: base_time(),
    }
}

pub(crate) fn actor(id: &str, role: Role) -> Actor {
    Actor {
        id: id.to_owned(),
        name: format!("Approver {id}"),
        position: format!("{} lead", role.as_str()),
        role,
    }
}

pub(crate) fn signature(owner: &str) -> SignatureImage {
    SignatureImage(format!("data:image/png;base64,{owner}"))
}

/// Minimal store for service tests. `racing` simulates another writer committing between
/// every load and save; `unavailable` fails every call.
#[derive(Default)]
pub(crate) struct MemoryStore {
    requests: Mutex<BTreeMap<RequestId, Request>>,
    racing: bool,
    unavailable: bool,
}

impl MemoryStore {
    pub(crate) fn with(requests: Vec<Request>) -> Self {
        let requests = requests.into_iter().map(|request| (request.id.clone(), request)).collect();
        Self { requests: Mutex::new(requests), ..Self::default() }
    }

    pub(crate) fn racing(requests: Vec<Request>) -> Self {
        Self { racing: true, ..Self::with(requests) }
    }

    pub(crate) fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("store offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        self.check()?;
        Ok(self.requests.lock().expect("store lock").get(id).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError> {
        self.check()?;
        let requests = self.requests.lock().expect("store lock");
        Ok(requests.values().filter(|request| filter.matches(request)).cloned().collect())
    }

    async fn insert(&self, request: &Request) -> Result<Request, StoreError> {
        self.check()?;
        let mut requests = self.requests.lock().expect("store lock");
        if requests.contains_key(&request.id) {
            return Err(StoreError::Duplicate(request.id.clone()));
        }
        requests.insert(request.id.clone(), request.clone());
        Ok(request.clone())
    }

    async fn save_transition(
        &self,
        request: &Request,
        expected_version: u32,
    ) -> Result<Request, StoreError> {
        self.check()?;
        let mut requests = self.requests.lock().expect("store lock");
        let stored = requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::NotFound(request.id.clone()))?;
        if self.racing {
            stored.version += 1;
        }
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                id: request.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        let mut next = request.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }
}
