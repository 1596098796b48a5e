use crate::commands::{with_migrated_pool, CommandResult};
use claimdesk_db::migrations::MIGRATOR;

pub fn run() -> CommandResult {
    let result = with_migrated_pool("migrate", |_config, _pool| async {
        let known = MIGRATOR
            .iter()
            .filter(|migration| !migration.migration_type.is_down_migration())
            .count();
        Ok(known)
    });

    match result {
        Ok(known) => {
            CommandResult::success("migrate", format!("applied pending migrations ({known} known)"))
        }
        Err(failure) => failure,
    }
}
