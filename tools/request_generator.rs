//! Request generator
//!
//! Sends random inference requests to the engine over NATS request/reply and
//! prints the replies. `request-generator signature` prints a sample
//! signature document in the legacy column order instead.

use rand::Rng;
use seizure_risk_engine::artifacts::signature::LEGACY_FEATURE_ORDER;
use seizure_risk_engine::feature_resolver::{DailyLog, RollingAverages};
use seizure_risk_engine::types::{ErrorPayload, InferenceRequest, PredictionResponse};
use std::time::Duration;
use tracing::{info, warn};

struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    profiles: Vec<String>,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            profiles: (1..=24).map(|i| format!("chb{:02}", i)).collect(),
        }
    }

    /// A well-rested, low-stress, adherent day
    fn generate_stable(&mut self) -> InferenceRequest {
        let profile = self.random_profile();
        InferenceRequest::new(
            (self.rng.gen_range(6.5..9.0f64) * 10.0).round() / 10.0,
            self.rng.gen_range(0..5),
            1,
        )
        .with_profile(&profile)
    }

    /// Short sleep, high stress, often a missed dose, after a rough week
    fn generate_provoking(&mut self) -> InferenceRequest {
        let profile = self.random_profile();
        let medication = if self.rng.gen_bool(0.6) { 0 } else { 1 };
        let sleep = (self.rng.gen_range(2.0..5.5f64) * 10.0).round() / 10.0;

        let week: Vec<DailyLog> = (0..7).map(|_| self.rough_day(sleep)).collect();
        let averages = RollingAverages::from_history(&week);

        let request = InferenceRequest::new(sleep, self.rng.gen_range(6..=10), medication)
            .with_profile(&profile);
        match (averages.sleep_hours, averages.stress_level, averages.medication_taken) {
            (Some(s), Some(st), Some(m)) => request.with_averages(s, st, m),
            _ => request,
        }
    }

    fn rough_day(&mut self, sleep: f64) -> DailyLog {
        DailyLog {
            hours_of_sleep: (sleep + self.rng.gen_range(0.0..2.0)).min(24.0),
            stress_level: self.rng.gen_range(5..=10) as f64,
            medication_taken: if self.rng.gen_bool(0.6) { 1.0 } else { 0.0 },
        }
    }

    fn random_profile(&mut self) -> String {
        let i = self.rng.gen_range(0..self.profiles.len());
        self.profiles[i].clone()
    }
}

fn print_sample_signature() -> anyhow::Result<()> {
    let document = serde_json::json!({
        "feature_order": LEGACY_FEATURE_ORDER,
        "risk_policy": "three_tier_v1",
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn describe_reply(payload: &[u8]) -> String {
    if let Ok(response) = serde_json::from_slice::<PredictionResponse>(payload) {
        format!(
            "{:>5.1}% {} (baseline {})",
            response.risk_percentage, response.status, response.baseline_used
        )
    } else if let Ok(err) = serde_json::from_slice::<ErrorPayload>(payload) {
        format!("error {}: {}", err.error, err.detail)
    } else {
        String::from_utf8_lossy(payload).into_owned()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("request_generator=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("signature") {
        return print_sample_signature();
    }

    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("seizure.risk.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let provoking_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.3);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(200);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        provoking_rate = provoking_rate,
        "Configuration loaded"
    );

    let client = async_nats::connect(nats_url).await?;
    info!("Connected to NATS");

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();
    let mut failures = 0u64;

    for i in 0..count {
        let request = if rng.gen_bool(provoking_rate.clamp(0.0, 1.0)) {
            generator.generate_provoking()
        } else {
            generator.generate_stable()
        };
        let payload = serde_json::to_vec(&request)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => info!(
                "[{}/{}] profile={} sleep={:?} stress={:?} -> {}",
                i + 1,
                count,
                request.profile_id.as_deref().unwrap_or("-"),
                request.sleep_hours,
                request.stress_level,
                describe_reply(&reply.payload)
            ),
            Err(e) => {
                failures += 1;
                warn!(error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!("Completed {} requests ({} without reply)", count, failures);
    Ok(())
}
