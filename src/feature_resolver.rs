//! Feature resolution: merges runtime signals, rolling averages and the
//! physiological baseline into one flat feature record.
//!
//! Precedence is fixed: runtime values, then rolling averages, then
//! baseline columns. A later source never overwrites an earlier one.

use crate::artifacts::{BaselineTable, FeatureSignature};
use crate::error::ResolveError;
use crate::types::{InferenceRequest, NumericInput};
use tracing::debug;

/// Reported as `baseline_used` when no baseline table is loaded
pub const NO_BASELINE: &str = "none";

/// Entries of a log history averaged into a rolling feature
pub const ROLLING_WINDOW: usize = 7;

/// Lifestyle signals supplied at request time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifestyleSignal {
    HoursOfSleep,
    StressLevel,
    MedicationTaken,
}

impl LifestyleSignal {
    pub const ALL: [LifestyleSignal; 3] = [
        LifestyleSignal::HoursOfSleep,
        LifestyleSignal::StressLevel,
        LifestyleSignal::MedicationTaken,
    ];

    /// Instantaneous feature name
    pub fn feature_name(&self) -> &'static str {
        match self {
            LifestyleSignal::HoursOfSleep => "hours_of_sleep",
            LifestyleSignal::StressLevel => "stress_level",
            LifestyleSignal::MedicationTaken => "medication_taken",
        }
    }

    /// Rolling-average feature name
    pub fn rolling_name(&self) -> &'static str {
        match self {
            LifestyleSignal::HoursOfSleep => "hours_of_sleep_7day_avg",
            LifestyleSignal::StressLevel => "stress_level_7day_avg",
            LifestyleSignal::MedicationTaken => "medication_taken_7day_avg",
        }
    }
}

/// One day of lifestyle logging, as kept by the excluded log store
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLog {
    pub hours_of_sleep: f64,
    pub stress_level: f64,
    pub medication_taken: f64,
}

/// Caller-supplied trailing averages
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingAverages {
    pub sleep_hours: Option<f64>,
    pub stress_level: Option<f64>,
    pub medication_taken: Option<f64>,
}

impl RollingAverages {
    /// Means over the last [`ROLLING_WINDOW`] entries of a chronologically
    /// ordered history. An empty history yields no averages.
    pub fn from_history(history: &[DailyLog]) -> Self {
        let window = &history[history.len().saturating_sub(ROLLING_WINDOW)..];
        if window.is_empty() {
            return Self::default();
        }

        let n = window.len() as f64;
        let mean = |f: fn(&DailyLog) -> f64| window.iter().map(f).sum::<f64>() / n;

        Self {
            sleep_hours: Some(mean(|l| l.hours_of_sleep)),
            stress_level: Some(mean(|l| l.stress_level)),
            medication_taken: Some(mean(|l| l.medication_taken)),
        }
    }

    fn get(&self, signal: LifestyleSignal) -> Option<f64> {
        match signal {
            LifestyleSignal::HoursOfSleep => self.sleep_hours,
            LifestyleSignal::StressLevel => self.stress_level,
            LifestyleSignal::MedicationTaken => self.medication_taken,
        }
    }
}

/// Validated runtime inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeInputs {
    pub sleep_hours: f64,
    pub stress_level: f64,
    pub medication_taken: f64,
    pub averages: RollingAverages,
}

impl RuntimeInputs {
    /// Coerce and range-check the numeric fields of a request
    pub fn from_request(request: &InferenceRequest) -> Result<Self, ResolveError> {
        let sleep_hours = coerce("sleep_hours", &request.sleep_hours)?;
        check_range("sleep_hours", sleep_hours, 0.0, 24.0, "0..=24")?;

        let stress_level = coerce("stress_level", &request.stress_level)?;
        check_range("stress_level", stress_level, 0.0, 10.0, "integer 0..=10")?;
        if stress_level.fract() != 0.0 {
            return Err(ResolveError::OutOfRange {
                field: "stress_level",
                value: stress_level,
                expected: "integer 0..=10",
            });
        }

        let medication_taken = coerce("medication_taken", &request.medication_taken)?;
        if medication_taken != 0.0 && medication_taken != 1.0 {
            return Err(ResolveError::OutOfRange {
                field: "medication_taken",
                value: medication_taken,
                expected: "0 or 1",
            });
        }

        let averages = RollingAverages {
            sleep_hours: optional("sleep_hours_avg", &request.sleep_hours_avg, 0.0, 24.0, "0..=24")?,
            stress_level: optional("stress_level_avg", &request.stress_level_avg, 0.0, 10.0, "0..=10")?,
            medication_taken: optional(
                "medication_taken_avg",
                &request.medication_taken_avg,
                0.0,
                1.0,
                "0..=1",
            )?,
        };

        Ok(Self {
            sleep_hours,
            stress_level,
            medication_taken,
            averages,
        })
    }

    pub fn with_averages(mut self, averages: RollingAverages) -> Self {
        self.averages = averages;
        self
    }

    fn value(&self, signal: LifestyleSignal) -> f64 {
        match signal {
            LifestyleSignal::HoursOfSleep => self.sleep_hours,
            LifestyleSignal::StressLevel => self.stress_level,
            LifestyleSignal::MedicationTaken => self.medication_taken,
        }
    }
}

fn coerce(field: &'static str, input: &NumericInput) -> Result<f64, ResolveError> {
    let value = match input {
        NumericInput::Number(n) => *n,
        NumericInput::Text(s) => s.trim().parse::<f64>().map_err(|_| ResolveError::NotNumeric {
            field,
            value: s.clone(),
        })?,
    };

    if !value.is_finite() {
        return Err(ResolveError::NotNumeric {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<(), ResolveError> {
    if value < min || value > max {
        return Err(ResolveError::OutOfRange {
            field,
            value,
            expected,
        });
    }
    Ok(())
}

fn optional(
    field: &'static str,
    input: &Option<NumericInput>,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<Option<f64>, ResolveError> {
    match input {
        None => Ok(None),
        Some(input) => {
            let value = coerce(field, input)?;
            check_range(field, value, min, max, expected)?;
            Ok(Some(value))
        }
    }
}

/// Feature name to value mapping that keeps insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    entries: Vec<(String, f64)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is already present. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, name: &str, value: f64) -> bool {
        if self.contains(name) {
            return false;
        }
        self.entries.push((name.to_string(), value));
        true
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved record and the baseline row that filled it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFeatures {
    pub record: FeatureRecord,
    pub baseline_used: String,
}

/// Resolves features against one loaded signature and baseline table
pub struct FeatureResolver<'a> {
    signature: &'a FeatureSignature,
    baseline: Option<&'a BaselineTable>,
}

impl<'a> FeatureResolver<'a> {
    pub fn new(signature: &'a FeatureSignature, baseline: Option<&'a BaselineTable>) -> Self {
        Self {
            signature,
            baseline,
        }
    }

    /// Validate a raw request and resolve it
    pub fn resolve_request(
        &self,
        profile_id: &str,
        request: &InferenceRequest,
    ) -> Result<ResolvedFeatures, ResolveError> {
        let inputs = RuntimeInputs::from_request(request)?;
        Ok(self.resolve(profile_id, &inputs))
    }

    pub fn resolve(&self, profile_id: &str, inputs: &RuntimeInputs) -> ResolvedFeatures {
        let mut record = FeatureRecord::new();

        for signal in LifestyleSignal::ALL {
            record.insert_if_absent(signal.feature_name(), inputs.value(signal));
        }

        // No historical aggregation online: a missing average falls back to
        // the instantaneous value.
        for signal in LifestyleSignal::ALL {
            let name = signal.rolling_name();
            if self.signature.declares(name) {
                let value = inputs.averages.get(signal).unwrap_or_else(|| inputs.value(signal));
                record.insert_if_absent(name, value);
            }
        }

        let baseline_used = match self.baseline {
            Some(table) => {
                let row = table.lookup(profile_id);
                if !row.source_id().contains(profile_id) {
                    debug!(
                        profile_id = %profile_id,
                        baseline = %row.source_id(),
                        "No baseline row matches profile, using default row"
                    );
                }
                for (feature, value) in row.features() {
                    record.insert_if_absent(feature.column(), *value);
                }
                row.source_id().to_string()
            }
            None => NO_BASELINE.to_string(),
        };

        ResolvedFeatures {
            record,
            baseline_used,
        }
    }
}
