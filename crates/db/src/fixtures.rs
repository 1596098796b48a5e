use claimdesk_core::domain::request::{RequestId, Stage};
use claimdesk_core::store::RequestStore;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlRequestRepository};

/// Canonical demo requests and the contract `verify` checks them against.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        id: "seed-wedding-001",
        request_type: "wedding",
        status: "pending_manager",
        employee_id: "E-100",
        stamped_stages: &[],
        description: "Wedding allowance waiting on the team manager",
    },
    SeedRequestContract {
        id: "seed-training-001",
        request_type: "training",
        status: "pending_hr",
        employee_id: "E-200",
        stamped_stages: &[Stage::Manager],
        description: "Over-budget training with an even cost split, waiting on HR",
    },
    SeedRequestContract {
        id: "seed-advance-001",
        request_type: "advance",
        status: "pending_accounting",
        employee_id: "E-100",
        stamped_stages: &[Stage::Manager],
        description: "Travel advance routed from the manager straight to accounting",
    },
    SeedRequestContract {
        id: "seed-childbirth-001",
        request_type: "childbirth",
        status: "completed",
        employee_id: "E-100",
        stamped_stages: &[Stage::Manager, Stage::Hr],
        description: "Completed childbirth claim for two children",
    },
    SeedRequestContract {
        id: "seed-funeral-001",
        request_type: "funeral",
        status: "rejected_hr",
        employee_id: "E-200",
        stamped_stages: &[Stage::Hr],
        description: "Parent funeral claim rejected by HR",
    },
    SeedRequestContract {
        id: "seed-dental-001",
        request_type: "dental",
        status: "pending_executive",
        employee_id: "E-300",
        stamped_stages: &[],
        description: "Dental claim waiting on an assigned executive",
    },
];

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Idempotent; existing rows with the same ids are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let requests_seeded = SEED_REQUESTS
            .iter()
            .map(|seed| RequestSeedInfo {
                request_id: seed.id,
                status: seed.status,
                description: seed.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { requests_seeded })
    }

    /// Checks each seed row exists with its expected status and decodes through the
    /// request repository with the expected approval stamps.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let repository = SqlRequestRepository::new(pool.clone());
        let mut checks = Vec::new();

        for seed in SEED_REQUESTS {
            let row_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM benefit_request
                 WHERE id = ?1 AND status = ?2 AND request_type = ?3 AND employee_id = ?4)",
            )
            .bind(seed.id)
            .bind(seed.status)
            .bind(seed.request_type)
            .bind(seed.employee_id)
            .fetch_one(pool)
            .await?;
            checks.push((seed.id, row_exists == 1));

            let decoded = repository
                .find_by_id(&RequestId(seed.id.to_string()))
                .await
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            let stamps_match = decoded
                .map(|request| {
                    request.stamps.keys().copied().collect::<Vec<_>>()
                        == sorted_stages(seed.stamped_stages)
                })
                .unwrap_or(false);
            checks.push((seed.stamps_label(), stamps_match));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let quoted = sql_array_from_ids(SEED_REQUESTS.iter().map(|seed| seed.id));
        sqlx::query(&format!("DELETE FROM benefit_request WHERE id IN {quoted}"))
            .execute(pool)
            .await?;
        Ok(())
    }

    pub fn request_ids() -> Vec<&'static str> {
        SEED_REQUESTS.iter().map(|seed| seed.id).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    id: &'static str,
    request_type: &'static str,
    status: &'static str,
    employee_id: &'static str,
    stamped_stages: &'static [Stage],
    description: &'static str,
}

impl SeedRequestContract {
    fn stamps_label(&self) -> &'static str {
        match self.id {
            "seed-wedding-001" => "seed-wedding-001-stamps",
            "seed-training-001" => "seed-training-001-stamps",
            "seed-advance-001" => "seed-advance-001-stamps",
            "seed-childbirth-001" => "seed-childbirth-001-stamps",
            "seed-funeral-001" => "seed-funeral-001-stamps",
            _ => "seed-dental-001-stamps",
        }
    }
}

fn sorted_stages(stages: &[Stage]) -> Vec<Stage> {
    let mut sorted = stages.to_vec();
    sorted.sort();
    sorted
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
