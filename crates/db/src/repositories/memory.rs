use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};

use claimdesk_core::domain::request::{Request, RequestId};
use claimdesk_core::store::{
    ChangeFeed, ChangeKind, RequestChange, RequestFilter, RequestStore, StoreError,
};

use super::CHANGE_FEED_CAPACITY;

/// Same contract as the SQL repository, kept in process memory.
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<RequestId, Request>>,
    changes: broadcast::Sender<RequestChange>,
}

impl Default for InMemoryRequestRepository {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { requests: RwLock::new(HashMap::new()), changes }
    }
}

impl InMemoryRequestRepository {
    pub fn with_requests(requests: impl IntoIterator<Item = Request>) -> Self {
        let repository = Self::default();
        let seeded = requests.into_iter().map(|request| (request.id.clone(), request)).collect();
        Self { requests: RwLock::new(seeded), ..repository }
    }

    fn publish(&self, kind: ChangeKind, request: &Request) {
        let _ = self.changes.send(RequestChange { kind, request: request.clone() });
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(id).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError> {
        let requests = self.requests.read().await;
        let mut matched: Vec<Request> =
            requests.values().filter(|request| filter.matches(request)).cloned().collect();
        matched.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(matched)
    }

    async fn insert(&self, request: &Request) -> Result<Request, StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(StoreError::Duplicate(request.id.clone()));
        }
        requests.insert(request.id.clone(), request.clone());
        drop(requests);

        self.publish(ChangeKind::Inserted, request);
        Ok(request.clone())
    }

    async fn save_transition(
        &self,
        request: &Request,
        expected_version: u32,
    ) -> Result<Request, StoreError> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::NotFound(request.id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                id: request.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut next = request.clone();
        next.version = expected_version.saturating_add(1);
        *stored = next.clone();
        drop(requests);

        self.publish(ChangeKind::Updated, &next);
        Ok(next)
    }
}

impl ChangeFeed for InMemoryRequestRepository {
    fn subscribe(&self) -> broadcast::Receiver<RequestChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use claimdesk_core::domain::request::{
        Request, RequestId, RequestStatus, RequestType, Requester,
    };
    use claimdesk_core::store::{ChangeFeed, ChangeKind, RequestFilter, RequestStore, StoreError};

    use crate::repositories::InMemoryRequestRepository;

    fn request(id: &str, employee: &str, minute: u32) -> Request {
        let created_at = Utc.with_ymd_and_hms(2026, 9, 1, 8, minute, 0).single().expect("time");
        Request {
            id: RequestId(id.to_string()),
            request_type: RequestType::Dental,
            status: RequestStatus::PendingManager,
            requester: Requester {
                employee_id: employee.to_string(),
                name: "Pim".to_string(),
                department: "Finance".to_string(),
                contact: None,
            },
            title: None,
            amount: Decimal::new(1_500, 0),
            excess_amount: Decimal::ZERO,
            payment_split: None,
            waiver: None,
            children: None,
            funeral_type: None,
            executive_id: None,
            manager_id: None,
            requester_signature: None,
            stamps: BTreeMap::new(),
            revision_count: 0,
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn in_memory_request_repo_round_trip() {
        let repo = InMemoryRequestRepository::default();
        let saved = request("REQ-1", "E-200", 0);

        repo.insert(&saved).await.expect("insert");
        let found = repo.find_by_id(&saved.id).await.expect("find");

        assert_eq!(found, Some(saved.clone()));
        assert_eq!(repo.insert(&saved).await, Err(StoreError::Duplicate(saved.id)));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let repo = InMemoryRequestRepository::with_requests([request("REQ-1", "E-200", 0)]);
        let mut feed = repo.subscribe();

        let mut next = request("REQ-1", "E-200", 0);
        next.status = RequestStatus::PendingHr;
        let stored = repo.save_transition(&next, 1).await.expect("transition");
        assert_eq!(stored.version, 2);

        let error = repo.save_transition(&next, 1).await.expect_err("stale");
        assert!(matches!(error, StoreError::Conflict { expected: 1, actual: 2, .. }));

        let change = feed.recv().await.expect("change");
        assert_eq!(change.kind, ChangeKind::Updated);
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let repo = InMemoryRequestRepository::with_requests([
            request("REQ-1", "E-200", 0),
            request("REQ-2", "E-200", 5),
            request("REQ-3", "E-300", 9),
        ]);

        let listed = repo.list(&RequestFilter::for_requester("E-200")).await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-2", "REQ-1"]);
    }
}
