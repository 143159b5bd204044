use forcage_db::SeedDataset;
use serde_json::json;

use crate::commands::{load_config, migrated_pool, runtime, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        let seeded = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = SeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            return Err(("seed_verification", failed_checks_message(&verification.checks), 6u8));
        }
        Ok::<_, CommandFailure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with(
            "seed",
            format!(
                "demo dataset loaded: {} agencies, {} client profiles, {} demandes",
                seeded.agencies.len(),
                seeded.profiles_seeded.len(),
                seeded.demandes_seeded.len()
            ),
            Some(json!({
                "agencies": seeded.agencies,
                "profiles": seeded.profiles_seeded,
                "demandes": seeded.demandes_seeded,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::failed_checks_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [
            ("cli-dkr-001", true),
            ("FRC-2025-000001", false),
            ("history-seed-dem-0001", false),
        ];

        assert_eq!(
            failed_checks_message(&checks),
            "Seed verification failed for checks: FRC-2025-000001, history-seed-dem-0001"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("cli-dkr-001", true), ("reference-counter-2025", true)];

        assert_eq!(failed_checks_message(&checks), "Some seed data failed to load");
    }
}
