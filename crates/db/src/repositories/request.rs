use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tokio::sync::broadcast;

use claimdesk_core::domain::request::{
    ChildRecord, FuneralType, Request, RequestId, RequestStatus, RequestType, Requester,
    SignatureImage, Stage, StageStamp,
};
use claimdesk_core::store::{
    ChangeFeed, ChangeKind, RequestChange, RequestFilter, RequestStore, StoreError,
};
use claimdesk_core::waiver::{PaymentSplit, WaiverSelection};

use super::{RepositoryError, CHANGE_FEED_CAPACITY};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
    request_type,
    status,
    employee_id,
    requester_name,
    department,
    contact,
    title,
    amount,
    excess_amount,
    payment_split_json,
    waiver_json,
    children_json,
    funeral_type,
    executive_id,
    manager_id,
    requester_signature,
    stamps_json,
    revision_count,
    version,
    created_at,
    updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
    changes: broadcast::Sender<RequestChange>,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    fn publish(&self, kind: ChangeKind, request: &Request) {
        // Nobody listening is fine.
        let _ = self.changes.send(RequestChange { kind, request: request.clone() });
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM benefit_request WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        row.map(request_from_row).transpose()
    }

    async fn fetch_filtered(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<Request>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM benefit_request WHERE 1 = 1"
        ));

        if !filter.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut values = builder.separated(", ");
            for status in &filter.statuses {
                values.push_bind(status.as_str());
                if *status == RequestStatus::Completed {
                    values.push_bind("approved");
                }
            }
            values.push_unseparated(")");
        }
        if !filter.types.is_empty() {
            builder.push(" AND request_type IN (");
            let mut values = builder.separated(", ");
            for request_type in &filter.types {
                values.push_bind(request_type.as_str());
            }
            values.push_unseparated(")");
        }
        if !filter.requester_ids.is_empty() {
            builder.push(" AND employee_id IN (");
            let mut values = builder.separated(", ");
            for employee_id in &filter.requester_ids {
                values.push_bind(employee_id.clone());
            }
            values.push_unseparated(")");
        }
        if let Some(executive_id) = &filter.executive_id {
            builder.push(" AND executive_id = ").push_bind(executive_id.clone());
        }
        builder.push(" ORDER BY created_at DESC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(request_from_row).collect()
    }

    async fn write_new(&self, request: &Request) -> Result<bool, RepositoryError> {
        let encoded = EncodedRequest::from_request(request)?;
        let result = sqlx::query(&format!(
            "INSERT INTO benefit_request ({REQUEST_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING"
        ))
        .bind(&request.id.0)
        .bind(request.request_type.as_str())
        .bind(request.status.as_str())
        .bind(&request.requester.employee_id)
        .bind(&request.requester.name)
        .bind(&request.requester.department)
        .bind(request.requester.contact.as_deref())
        .bind(request.title.as_deref())
        .bind(request.amount.to_string())
        .bind(request.excess_amount.to_string())
        .bind(encoded.payment_split_json)
        .bind(encoded.waiver_json)
        .bind(encoded.children_json)
        .bind(request.funeral_type.as_ref().map(FuneralType::as_str))
        .bind(request.executive_id.as_deref())
        .bind(request.manager_id.as_deref())
        .bind(request.requester_signature.as_ref().map(|signature| signature.0.as_str()))
        .bind(encoded.stamps_json)
        .bind(i64::from(request.revision_count))
        .bind(i64::from(request.version))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Single conditional update; zero affected rows means someone else wrote first.
    async fn write_transition(
        &self,
        request: &Request,
        expected_version: u32,
    ) -> Result<TransitionWrite, RepositoryError> {
        let encoded = EncodedRequest::from_request(request)?;
        let next_version = expected_version.saturating_add(1);
        let result = sqlx::query(
            "UPDATE benefit_request SET
                status = ?,
                title = ?,
                amount = ?,
                excess_amount = ?,
                payment_split_json = ?,
                waiver_json = ?,
                children_json = ?,
                funeral_type = ?,
                executive_id = ?,
                manager_id = ?,
                requester_signature = ?,
                stamps_json = ?,
                revision_count = ?,
                version = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(request.title.as_deref())
        .bind(request.amount.to_string())
        .bind(request.excess_amount.to_string())
        .bind(encoded.payment_split_json)
        .bind(encoded.waiver_json)
        .bind(encoded.children_json)
        .bind(request.funeral_type.as_ref().map(FuneralType::as_str))
        .bind(request.executive_id.as_deref())
        .bind(request.manager_id.as_deref())
        .bind(request.requester_signature.as_ref().map(|signature| signature.0.as_str()))
        .bind(encoded.stamps_json)
        .bind(i64::from(request.revision_count))
        .bind(i64::from(next_version))
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(TransitionWrite::Written(next_version));
        }

        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM benefit_request WHERE id = ?")
                .bind(&request.id.0)
                .fetch_optional(&self.pool)
                .await?;
        match actual {
            Some(version) => Ok(TransitionWrite::Stale(parse_u32("version", version)?)),
            None => Ok(TransitionWrite::Missing),
        }
    }
}

enum TransitionWrite {
    Written(u32),
    Stale(u32),
    Missing,
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError> {
        Ok(self.fetch_filtered(filter).await?)
    }

    async fn insert(&self, request: &Request) -> Result<Request, StoreError> {
        if !self.write_new(request).await? {
            return Err(StoreError::Duplicate(request.id.clone()));
        }
        self.publish(ChangeKind::Inserted, request);
        Ok(request.clone())
    }

    async fn save_transition(
        &self,
        request: &Request,
        expected_version: u32,
    ) -> Result<Request, StoreError> {
        match self.write_transition(request, expected_version).await? {
            TransitionWrite::Written(version) => {
                let mut stored = request.clone();
                stored.version = version;
                self.publish(ChangeKind::Updated, &stored);
                Ok(stored)
            }
            TransitionWrite::Stale(actual) => Err(StoreError::Conflict {
                id: request.id.clone(),
                expected: expected_version,
                actual,
            }),
            TransitionWrite::Missing => Err(StoreError::NotFound(request.id.clone())),
        }
    }
}

impl ChangeFeed for SqlRequestRepository {
    fn subscribe(&self) -> broadcast::Receiver<RequestChange> {
        self.changes.subscribe()
    }
}

struct EncodedRequest {
    payment_split_json: Option<String>,
    waiver_json: Option<String>,
    children_json: Option<String>,
    stamps_json: String,
}

impl EncodedRequest {
    fn from_request(request: &Request) -> Result<Self, RepositoryError> {
        Ok(Self {
            payment_split_json: request.payment_split.as_ref().map(encode).transpose()?,
            waiver_json: request.waiver.as_ref().map(encode).transpose()?,
            children_json: request.children.as_ref().map(encode).transpose()?,
            stamps_json: encode(&request.stamps)?,
        })
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

fn request_from_row(row: SqliteRow) -> Result<Request, RepositoryError> {
    let type_raw = row.try_get::<String, _>("request_type")?;
    let request_type = RequestType::parse(&type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request type `{type_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    let funeral_type = row
        .try_get::<Option<String>, _>("funeral_type")?
        .map(|value| {
            FuneralType::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown funeral type `{value}`")))
        })
        .transpose()?;

    let payment_split = row
        .try_get::<Option<String>, _>("payment_split_json")?
        .map(|value| decode::<PaymentSplit>("payment_split_json", &value))
        .transpose()?;
    let waiver = row
        .try_get::<Option<String>, _>("waiver_json")?
        .map(|value| decode::<WaiverSelection>("waiver_json", &value))
        .transpose()?;
    let children = row
        .try_get::<Option<String>, _>("children_json")?
        .map(|value| decode::<Vec<ChildRecord>>("children_json", &value))
        .transpose()?;
    let stamps: BTreeMap<Stage, StageStamp> =
        decode("stamps_json", &row.try_get::<String, _>("stamps_json")?)?;

    Ok(Request {
        id: RequestId(row.try_get("id")?),
        request_type,
        status,
        requester: Requester {
            employee_id: row.try_get("employee_id")?,
            name: row.try_get("requester_name")?,
            department: row.try_get("department")?,
            contact: row.try_get("contact")?,
        },
        title: row.try_get("title")?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        excess_amount: parse_decimal("excess_amount", row.try_get("excess_amount")?)?,
        payment_split,
        waiver,
        children,
        funeral_type,
        executive_id: row.try_get("executive_id")?,
        manager_id: row.try_get("manager_id")?,
        requester_signature: row
            .try_get::<Option<String>, _>("requester_signature")?
            .map(SignatureImage),
        stamps,
        revision_count: parse_u32("revision_count", row.try_get("revision_count")?)?,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim()).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use claimdesk_core::domain::action::Decision;
    use claimdesk_core::domain::request::{
        ChildRecord, FuneralType, Request, RequestId, RequestStatus, RequestType, Requester,
        SignatureImage, Stage, StageStamp,
    };
    use claimdesk_core::store::{ChangeFeed, ChangeKind, RequestFilter, RequestStore, StoreError};
    use claimdesk_core::waiver::{PaymentSplit, WaiverSelection};

    use super::SqlRequestRepository;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_request(id: &str, employee: &str, request_type: RequestType) -> Request {
        Request {
            id: RequestId(id.to_string()),
            request_type,
            status: RequestStatus::PendingManager,
            requester: Requester {
                employee_id: employee.to_string(),
                name: "Nok Srisuk".to_string(),
                department: "Sales".to_string(),
                contact: Some("U-NOK".to_string()),
            },
            title: Some("Rust workshop".to_string()),
            amount: Decimal::new(1_200_050, 2),
            excess_amount: Decimal::new(200_050, 2),
            payment_split: None,
            waiver: None,
            children: None,
            funeral_type: None,
            executive_id: None,
            manager_id: Some("M-10".to_string()),
            requester_signature: Some(SignatureImage("data:image/png;base64,bm9r".to_string())),
            stamps: BTreeMap::new(),
            revision_count: 0,
            version: 1,
            created_at: parse_ts("2026-09-01T08:00:00Z"),
            updated_at: parse_ts("2026-09-01T08:00:00Z"),
        }
    }

    #[tokio::test]
    async fn sql_request_repo_round_trips_every_column() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let mut request = sample_request("REQ-1", "E-100", RequestType::Training);
        request.payment_split = Some(PaymentSplit {
            company_payment: Decimal::new(150_050, 2),
            employee_payment: Decimal::new(50_000, 2),
        });
        request.waiver = Some(WaiverSelection::partial(Decimal::new(50_025, 2)));
        request.children = Some(vec![ChildRecord {
            name: Some("Nid".to_string()),
            birth_date: NaiveDate::from_ymd_opt(2026, 8, 1),
        }]);
        request.funeral_type = Some(FuneralType::Parent);
        request.stamps.insert(
            Stage::Manager,
            StageStamp {
                approver_id: "M-10".to_string(),
                approver_name: "Mali".to_string(),
                approver_position: "Team Lead".to_string(),
                decision: Decision::Approve,
                decided_at: parse_ts("2026-09-02T09:30:00Z"),
                signature: Some(SignatureImage("data:image/png;base64,bWFsaQ==".to_string())),
                note: None,
            },
        );

        repo.insert(&request).await.expect("insert");
        let found = repo.find_by_id(&request.id).await.expect("find");
        assert_eq!(found, Some(request));

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_insert_is_refused() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = sample_request("REQ-1", "E-100", RequestType::Wedding);

        repo.insert(&request).await.expect("first insert");
        let error = repo.insert(&request).await.expect_err("second insert");
        assert_eq!(error, StoreError::Duplicate(request.id.clone()));

        pool.close().await;
    }

    #[tokio::test]
    async fn save_transition_checks_expected_version() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = sample_request("REQ-1", "E-100", RequestType::Wedding);
        repo.insert(&request).await.expect("insert");

        let mut approved = request.clone();
        approved.status = RequestStatus::PendingHr;
        let stored = repo.save_transition(&approved, 1).await.expect("first writer wins");
        assert_eq!(stored.version, 2);
        assert_eq!(stored.status, RequestStatus::PendingHr);

        let mut rejected = request.clone();
        rejected.status = RequestStatus::RejectedManager;
        let error = repo.save_transition(&rejected, 1).await.expect_err("stale writer loses");
        assert_eq!(
            error,
            StoreError::Conflict { id: request.id.clone(), expected: 1, actual: 2 }
        );

        let current = repo.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(current.status, RequestStatus::PendingHr);

        let missing = sample_request("REQ-404", "E-100", RequestType::Wedding);
        let error = repo.save_transition(&missing, 1).await.expect_err("missing row");
        assert_eq!(error, StoreError::NotFound(missing.id));

        pool.close().await;
    }

    #[tokio::test]
    async fn list_applies_filter_and_orders_newest_first() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());

        let older = sample_request("REQ-1", "E-100", RequestType::Wedding);
        let mut newer = sample_request("REQ-2", "E-100", RequestType::Funeral);
        newer.created_at = parse_ts("2026-09-03T08:00:00Z");
        let mut other = sample_request("REQ-3", "E-200", RequestType::Wedding);
        other.status = RequestStatus::Completed;
        for request in [&older, &newer, &other] {
            repo.insert(request).await.expect("insert");
        }

        let mine = repo.list(&RequestFilter::for_requester("E-100")).await.expect("list");
        let ids: Vec<&str> = mine.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-2", "REQ-1"]);

        let weddings = repo
            .list(
                &RequestFilter::default()
                    .with_types([RequestType::Wedding])
                    .with_statuses([RequestStatus::Completed]),
            )
            .await
            .expect("list");
        assert_eq!(weddings.len(), 1);
        assert_eq!(weddings[0].id, other.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn legacy_approved_status_reads_as_completed() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        repo.insert(&sample_request("REQ-1", "E-100", RequestType::Wedding))
            .await
            .expect("insert");
        sqlx::query("UPDATE benefit_request SET status = 'approved' WHERE id = 'REQ-1'")
            .execute(&pool)
            .await
            .expect("legacy status");

        let completed = repo
            .list(&RequestFilter::default().with_statuses([RequestStatus::Completed]))
            .await
            .expect("list");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, RequestStatus::Completed);

        pool.close().await;
    }

    #[tokio::test]
    async fn committed_writes_are_published() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let mut feed = repo.subscribe();

        let request = sample_request("REQ-1", "E-100", RequestType::Wedding);
        repo.insert(&request).await.expect("insert");
        let mut moved = request.clone();
        moved.status = RequestStatus::PendingHr;
        repo.save_transition(&moved, 1).await.expect("transition");
        let _ = repo.save_transition(&moved, 1).await;

        let inserted = feed.recv().await.expect("insert event");
        assert_eq!(inserted.kind, ChangeKind::Inserted);
        let updated = feed.recv().await.expect("update event");
        assert_eq!(updated.kind, ChangeKind::Updated);
        assert_eq!(updated.request.version, 2);
        assert!(feed.try_recv().is_err(), "failed writes publish nothing");

        pool.close().await;
    }
}
