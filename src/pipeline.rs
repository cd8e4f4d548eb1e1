use std::{ops::Range, sync::Arc, time::Duration};

use rand::Rng;
use tracing::{field::Empty, Instrument};

use crate::{config::ChaosConfig, error::StageError, log_format::SPAN_EVENT_TARGET};

const BUSINESS_LOGIC_MS: Range<u64> = 50..150;
const DB_CALL_MS: Range<u64> = 20..70;
const SLOW_DB_MS: Range<u64> = 800..2000;
const TEMPLATE_MS: Range<u64> = 10..40;

/// Stall of a failed database call.
pub const DB_FAILURE_STALL: Duration = Duration::from_secs(2);

/// `CHAOS_ERROR` fails one business logic call in this many.
pub const ERROR_ONE_IN: u32 = 5;

/// Source of stage latencies and fault decisions.
pub trait DelaySource: Send + Sync {
    /// Duration drawn from `millis`, a range of milliseconds.
    fn delay(&self, millis: Range<u64>) -> Duration;

    /// Whether an event with probability `1 / one_in` happens.
    fn fires(&self, one_in: u32) -> bool;
}

/// Uniformly distributed delays from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDelays;

impl DelaySource for RandomDelays {
    fn delay(&self, millis: Range<u64>) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(millis))
    }

    fn fires(&self, one_in: u32) -> bool {
        rand::thread_rng().gen_ratio(1, one_in)
    }
}

/// The simulated three-tier request: business logic, database call, template
/// render. Each stage runs in its own span and sleeps for a randomized
/// duration; chaos toggles inject failures and stalls.
#[derive(Clone)]
pub struct Pipeline {
    chaos: ChaosConfig,
    delays: Arc<dyn DelaySource>,
}

impl Pipeline {
    pub fn new(chaos: ChaosConfig, delays: Arc<dyn DelaySource>) -> Self {
        Self { chaos, delays }
    }

    /// Runs the stages in order. A business logic failure skips the rest.
    pub async fn run(&self) -> Result<(), StageError> {
        self.business_logic()
            .instrument(tracing::info_span!(
                "service_B_business_logic",
                chaos = Empty,
                otel.status_code = Empty,
                otel.status_message = Empty,
            ))
            .await?;
        self.call_database()
            .instrument(tracing::info_span!(
                "service_C_db_call",
                chaos = Empty,
                otel.status_code = Empty,
                otel.status_message = Empty,
            ))
            .await;
        self.render_template()
            .instrument(tracing::info_span!("template_rendering"))
            .await;
        Ok(())
    }

    async fn business_logic(&self) -> Result<(), StageError> {
        tokio::time::sleep(self.delays.delay(BUSINESS_LOGIC_MS)).await;

        if self.chaos.error && self.delays.fires(ERROR_ONE_IN) {
            let err = StageError::BusinessLogic;
            mark_failed(&err.to_string(), "random_error");
            return Err(err);
        }

        Ok(())
    }

    async fn call_database(&self) {
        if self.chaos.db_failure {
            mark_failed("db timeout", "db_failure");
            tokio::time::sleep(DB_FAILURE_STALL).await;
            return;
        }

        if self.chaos.slow_db {
            tokio::time::sleep(self.delays.delay(SLOW_DB_MS)).await;
            tracing::Span::current().record("chaos", "slow_db");
            return;
        }

        tokio::time::sleep(self.delays.delay(DB_CALL_MS)).await;
    }

    async fn render_template(&self) {
        tokio::time::sleep(self.delays.delay(TEMPLATE_MS)).await;
    }
}

/// Marks the current stage span as failed by an injected fault and records
/// the fault as an `exception` span event.
fn mark_failed(message: &str, chaos: &str) {
    tracing::event!(
        target: SPAN_EVENT_TARGET,
        tracing::Level::ERROR,
        exception.message = message,
        "exception"
    );

    let span = tracing::Span::current();
    span.record("chaos", chaos);
    span.record("otel.status_code", "ERROR");
    span.record("otel.status_message", message);
}
