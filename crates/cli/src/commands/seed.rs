use crate::commands::{with_migrated_pool, CommandResult, Failure};
use claimdesk_db::{DemoSeedDataset, RequestSeedInfo};

pub fn run() -> CommandResult {
    let result = with_migrated_pool("seed", |_config, pool| async move {
        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err::<Vec<RequestSeedInfo>, Failure>((
                "seed_verification",
                verification_failure_message(&failed_checks),
                6u8,
            ));
        }

        Ok(seed_result.requests_seeded)
    });

    match result {
        Ok(requests) => {
            let descriptions: Vec<String> = requests
                .iter()
                .map(|seed| {
                    format!("  - {} [{}]: {}", seed.request_id, seed.status, seed.description)
                })
                .collect();
            let message = format!(
                "demo requests loaded across every approval stage:\n{}",
                descriptions.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err(failure) => failure,
    }
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
