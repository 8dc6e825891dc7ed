//! # Provider Adapter Example
//!
//! A payment adapter that wraps its remote call in a circuit breaker, and a
//! sync step that validates incoming records before persisting them.
//! The "remote provider" is simulated: it is down for the first few calls.

use anyhow::Result;
use guardian_core::{
    CircuitBreakerConfig, EffectKind, EffectPolicy, Guardian, GuardianConfig, GuardianError, Schema,
    ValidateOptions,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ============================================================================
// Payment provider (simulated remote)
// ============================================================================

struct PaymentProvider {
    calls: AtomicUsize,
    down_for: usize,
}

impl PaymentProvider {
    async fn charge(&self, amount_cents: u64) -> Result<Uuid> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;

        if call <= self.down_for {
            anyhow::bail!("provider unavailable (call {})", call);
        }
        tracing::info!(amount_cents, "provider accepted charge");
        Ok(Uuid::new_v4())
    }
}

// ============================================================================
// Adapter (uses the breaker)
// ============================================================================

struct PaymentAdapter {
    guardian: Guardian,
    provider: Arc<PaymentProvider>,
}

impl PaymentAdapter {
    const BREAKER: &'static str = "payment-provider";

    async fn charge(&self, amount_cents: u64) -> Result<Uuid, GuardianError> {
        self.guardian.require_positive(amount_cents, "amount_cents")?;

        let provider = self.provider.clone();
        self.guardian
            .execute_with_circuit_breaker(
                Self::BREAKER,
                || async move { provider.charge(amount_cents).await },
                None,
            )
            .await
    }
}

// ============================================================================
// Sync step (uses the validator)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CustomerRecord {
    email: String,
    plan: String,
    seats: u32,
    active: bool,
}

fn customer_schema() -> Schema {
    Schema::object()
        .field("email", Schema::string().min_length(3))
        .field("plan", Schema::enumeration(["free", "team", "enterprise"]))
        .field("seats", Schema::number().min(1.0).max(500.0).integer())
        .field("active", Schema::boolean())
        .into()
}

async fn sync_records(guardian: &Guardian, incoming: Vec<serde_json::Value>) -> Result<Vec<CustomerRecord>> {
    let batch = guardian.validate_batch(&incoming, &customer_schema(), ValidateOptions::default());
    for warning in &batch.warnings {
        println!("  coerced: {}", warning);
    }
    for failure in &batch.failed {
        println!("  rejected {}: {}", failure.item, failure.error);
    }

    // Persisting must only touch storage.
    let persisted = guardian
        .track_side_effects(
            EffectPolicy::new()
                .allow([EffectKind::Storage])
                .forbid([EffectKind::Network])
                .label("persist customers"),
            || async {
                let mut records = Vec::new();
                for data in batch.successful {
                    let record: CustomerRecord = serde_json::from_value(data)?;
                    guardian.track(EffectKind::Storage, format!("upsert {}", record.email), None);
                    records.push(record);
                }
                Ok(records)
            },
        )
        .await?;

    Ok(persisted.result)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GuardianConfig::default().with_breaker(
        PaymentAdapter::BREAKER,
        CircuitBreakerConfig::new(3, 2, 300),
    );
    let guardian = Guardian::from_config(config)?;

    // Payments
    let adapter = PaymentAdapter {
        guardian: guardian.clone(),
        provider: Arc::new(PaymentProvider {
            calls: AtomicUsize::new(0),
            down_for: 3,
        }),
    };

    for attempt in 1..=8 {
        match adapter.charge(1_999).await {
            Ok(payment_id) => println!("charge {}: ok ({})", attempt, payment_id),
            Err(err) if err.code() == "CIRCUIT_OPEN" => {
                println!("charge {}: skipped, {}", attempt, err.message());
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            Err(err) => println!("charge {}: failed, {}", attempt, err),
        }
    }

    // Record sync
    let incoming = vec![
        json!({ "email": " ana@example.com ", "plan": "Team", "seats": "12", "active": "TRUE" }),
        json!({ "email": "li@example.com", "plan": "enterprise", "seats": 900, "active": true }),
        json!({ "email": "x", "plan": "free", "seats": 1, "active": false }),
    ];
    println!("syncing {} records", incoming.len());
    let synced = sync_records(&guardian, incoming).await?;
    for record in &synced {
        println!(
            "  stored {} on {} ({} seats, active: {})",
            record.email, record.plan, record.seats, record.active
        );
    }

    println!("{}", serde_json::to_string_pretty(&guardian.report())?);

    Ok(())
}
