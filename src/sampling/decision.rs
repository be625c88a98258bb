//! Tail sampling decision logic.
//!
//! Runs on the redacted, finalized record only.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::record::fields::{Outcome, DURATION_MS, OUTCOME, STATUS_CODE};
use crate::sampling::random::{RandomSource, ThreadRandom};

pub const DEFAULT_SAMPLE_RATE_SUCCESS: f64 = 0.05;
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 2000;

/// Caller-supplied keep/drop function.
pub type SampleDecider = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Tail sampling settings.
#[derive(Clone, Deserialize)]
pub struct SamplingConfig {
    /// Probability of keeping a record no rule forces.
    #[serde(default = "default_rate", alias = "sampleRateSuccess")]
    pub sample_rate_success: f64,
    /// Requests slower than this are always kept.
    #[serde(default = "default_slow_threshold", alias = "slowThresholdMs")]
    pub slow_threshold_ms: u64,
    /// Replaces the default rules when set.
    #[serde(skip)]
    pub custom: Option<SampleDecider>,
}

fn default_rate() -> f64 {
    DEFAULT_SAMPLE_RATE_SUCCESS
}

fn default_slow_threshold() -> u64 {
    DEFAULT_SLOW_THRESHOLD_MS
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate_success: DEFAULT_SAMPLE_RATE_SUCCESS,
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            custom: None,
        }
    }
}

impl fmt::Debug for SamplingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingConfig")
            .field("sample_rate_success", &self.sample_rate_success)
            .field("slow_threshold_ms", &self.slow_threshold_ms)
            .field("custom", &self.custom.as_ref().map(|_| "<decider>"))
            .finish()
    }
}

impl SamplingConfig {
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.sample_rate_success = rate;
        self
    }

    pub fn with_slow_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.slow_threshold_ms = threshold_ms;
        self
    }

    /// Config whose only decision maker is `decider`.
    pub fn custom<F>(decider: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            custom: Some(Arc::new(decider)),
            ..Self::default()
        }
    }

    /// Replace an out-of-range or NaN rate with the default.
    pub fn normalized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.sample_rate_success) {
            log::warn!(
                "SAMPLING_RATE_INVALID rate={} fallback={}",
                self.sample_rate_success,
                DEFAULT_SAMPLE_RATE_SUCCESS
            );
            self.sample_rate_success = DEFAULT_SAMPLE_RATE_SUCCESS;
        }
        self
    }
}

impl<F> From<F> for SamplingConfig
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    fn from(decider: F) -> Self {
        Self::custom(decider)
    }
}

/// Which rule produced a sampling decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingDecision {
    KeepServerError,
    KeepTimeoutOrThrottled,
    KeepAborted,
    KeepError,
    KeepSlow,
    KeepSampled,
    DropSampled,
    Custom(bool),
}

impl SamplingDecision {
    pub fn is_keep(&self) -> bool {
        match self {
            SamplingDecision::DropSampled => false,
            SamplingDecision::Custom(keep) => *keep,
            _ => true,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SamplingDecision::KeepServerError => "server_error",
            SamplingDecision::KeepTimeoutOrThrottled => "timeout_or_throttled",
            SamplingDecision::KeepAborted => "aborted",
            SamplingDecision::KeepError => "error",
            SamplingDecision::KeepSlow => "slow",
            SamplingDecision::KeepSampled | SamplingDecision::DropSampled => "success_rate",
            SamplingDecision::Custom(_) => "custom",
        }
    }
}

/// Decide with the thread RNG.
pub fn should_sample(record: &Value, config: &SamplingConfig) -> bool {
    should_sample_with(record, config, &ThreadRandom)
}

/// Decide with an injected random source.
pub fn should_sample_with(record: &Value, config: &SamplingConfig, rng: &dyn RandomSource) -> bool {
    evaluate(record, config, rng).is_keep()
}

/// Full decision, including the rule that made it.
pub fn evaluate(record: &Value, config: &SamplingConfig, rng: &dyn RandomSource) -> SamplingDecision {
    match &config.custom {
        Some(decider) => SamplingDecision::Custom(decider(record)),
        None => default_decision(record, config, rng),
    }
}

/// Default rules only, ignoring any custom decider.
///
/// Custom deciders that want "defaults plus extra conditions" call this.
pub fn default_rules(record: &Value, config: &SamplingConfig, rng: &dyn RandomSource) -> bool {
    default_decision(record, config, rng).is_keep()
}

/// # Decision Tree
/// 1. status_code >= 500 -> keep
/// 2. status_code 408 or 429 -> keep
/// 3. outcome aborted -> keep
/// 4. outcome error -> keep
/// 5. duration_ms above the slow threshold -> keep
/// 6. otherwise keep with probability `sample_rate_success`
fn default_decision(record: &Value, config: &SamplingConfig, rng: &dyn RandomSource) -> SamplingDecision {
    let status = record.get(STATUS_CODE).and_then(Value::as_f64);
    let outcome = record.get(OUTCOME).and_then(Value::as_str);
    let duration = record.get(DURATION_MS).and_then(Value::as_f64);

    if let Some(status) = status {
        if status >= 500.0 {
            return SamplingDecision::KeepServerError;
        }
        if status == 408.0 || status == 429.0 {
            return SamplingDecision::KeepTimeoutOrThrottled;
        }
    }

    if outcome == Some(Outcome::Aborted.as_str()) {
        return SamplingDecision::KeepAborted;
    }
    if outcome == Some(Outcome::Error.as_str()) {
        return SamplingDecision::KeepError;
    }

    if let Some(duration) = duration {
        if duration > config.slow_threshold_ms as f64 {
            return SamplingDecision::KeepSlow;
        }
    }

    if rng.next_f64() < config.sample_rate_success {
        SamplingDecision::KeepSampled
    } else {
        SamplingDecision::DropSampled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::random::FixedRandom;
    use serde_json::json;

    fn record(status: u16, outcome: &str, duration: u64) -> Value {
        json!({"status_code": status, "outcome": outcome, "duration_ms": duration})
    }

    fn never() -> SamplingConfig {
        SamplingConfig::default().with_rate(0.0)
    }

    #[test]
    fn test_server_error_always_kept() {
        let rec = record(503, "success", 5);
        assert!(should_sample(&rec, &never()));
        assert_eq!(
            evaluate(&rec, &never(), &FixedRandom(0.99)),
            SamplingDecision::KeepServerError
        );
    }

    #[test]
    fn test_timeout_and_throttle_kept() {
        for status in [408, 429] {
            assert_eq!(
                evaluate(&record(status, "success", 5), &never(), &FixedRandom(0.99)),
                SamplingDecision::KeepTimeoutOrThrottled
            );
        }
    }

    #[test]
    fn test_outcomes_kept() {
        assert_eq!(
            evaluate(&record(499, "aborted", 5), &never(), &FixedRandom(0.99)),
            SamplingDecision::KeepAborted
        );
        assert_eq!(
            evaluate(&record(400, "error", 5), &never(), &FixedRandom(0.99)),
            SamplingDecision::KeepError
        );
    }

    #[test]
    fn test_slow_requests_kept() {
        let cfg = never();
        assert_eq!(
            evaluate(&record(200, "success", 2001), &cfg, &FixedRandom(0.99)),
            SamplingDecision::KeepSlow
        );
        assert_eq!(
            evaluate(&record(200, "success", 2000), &cfg, &FixedRandom(0.99)),
            SamplingDecision::DropSampled
        );
    }

    #[test]
    fn test_success_rate_draw() {
        let cfg = SamplingConfig::default().with_rate(0.5);
        let rec = record(200, "success", 10);
        assert!(should_sample_with(&rec, &cfg, &FixedRandom(0.49)));
        assert!(!should_sample_with(&rec, &cfg, &FixedRandom(0.5)));

        let always = SamplingConfig::default().with_rate(1.0);
        assert!(should_sample_with(&rec, &always, &FixedRandom(0.999)));
        assert!(!should_sample_with(&rec, &never(), &FixedRandom(0.0)));
    }

    #[test]
    fn test_custom_replaces_defaults() {
        let drop_all = SamplingConfig::custom(|_| false);
        assert!(!should_sample(&record(503, "error", 9000), &drop_all));

        let keep_vip: SamplingConfig =
            (|rec: &Value| rec.get("vip").and_then(Value::as_bool) == Some(true)).into();
        let mut rec = record(200, "success", 1);
        assert!(!should_sample(&rec, &keep_vip));
        rec["vip"] = json!(true);
        assert!(should_sample(&rec, &keep_vip));
    }

    #[test]
    fn test_custom_composes_with_defaults() {
        let composed = SamplingConfig::custom(|rec: &Value| {
            rec.get("vip").is_some() || default_rules(rec, &never(), &FixedRandom(0.99))
        });
        assert!(should_sample(&record(500, "error", 1), &composed));
        assert!(!should_sample(&record(200, "success", 1), &composed));
    }

    #[test]
    fn test_normalized_rate() {
        assert_eq!(
            SamplingConfig::default().with_rate(f64::NAN).normalized().sample_rate_success,
            DEFAULT_SAMPLE_RATE_SUCCESS
        );
        assert_eq!(
            SamplingConfig::default().with_rate(1.5).normalized().sample_rate_success,
            DEFAULT_SAMPLE_RATE_SUCCESS
        );
        assert_eq!(
            SamplingConfig::default().with_rate(0.0).normalized().sample_rate_success,
            0.0
        );
    }

    #[test]
    fn test_config_from_json() {
        let cfg: SamplingConfig =
            serde_json::from_value(json!({"sampleRateSuccess": 0.2, "slow_threshold_ms": 500}))
                .unwrap();
        assert_eq!(cfg.sample_rate_success, 0.2);
        assert_eq!(cfg.slow_threshold_ms, 500);
        assert!(cfg.custom.is_none());
    }
}
