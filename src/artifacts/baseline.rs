//! Physiological baseline table: one row of EEG summary features per known
//! profile, used to fill the physiological columns a runtime request lacks.

use crate::error::LoadError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Identifier column of the baseline table
pub const BASELINE_ID_COLUMN: &str = "eeg_source_id";

/// Shared prefix of every physiological feature column
pub const BASELINE_FEATURE_PREFIX: &str = "eeg_";

/// Recognised physiological baseline features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EegFeature {
    MeanAmp,
    StdAmp,
    Skewness,
    Kurtosis,
    PeakToPeak,
    DeltaPower,
    ThetaPower,
    AlphaPower,
    BetaPower,
}

impl EegFeature {
    pub const ALL: [EegFeature; 9] = [
        EegFeature::MeanAmp,
        EegFeature::StdAmp,
        EegFeature::Skewness,
        EegFeature::Kurtosis,
        EegFeature::PeakToPeak,
        EegFeature::DeltaPower,
        EegFeature::ThetaPower,
        EegFeature::AlphaPower,
        EegFeature::BetaPower,
    ];

    /// Column / feature name
    pub fn column(&self) -> &'static str {
        match self {
            EegFeature::MeanAmp => "eeg_mean_amp",
            EegFeature::StdAmp => "eeg_std_amp",
            EegFeature::Skewness => "eeg_skewness",
            EegFeature::Kurtosis => "eeg_kurtosis",
            EegFeature::PeakToPeak => "eeg_peak_to_peak",
            EegFeature::DeltaPower => "eeg_delta_power",
            EegFeature::ThetaPower => "eeg_theta_power",
            EegFeature::AlphaPower => "eeg_alpha_power",
            EegFeature::BetaPower => "eeg_beta_power",
        }
    }

    /// Exact-match a table column against the recognised set. Columns
    /// without the prefix and the identifier column never match.
    pub fn from_column(name: &str) -> Option<Self> {
        if !name.starts_with(BASELINE_FEATURE_PREFIX) || name == BASELINE_ID_COLUMN {
            return None;
        }
        Self::ALL.iter().copied().find(|f| f.column() == name)
    }
}

/// One profile's baseline values, in table column order
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRow {
    source_id: String,
    features: Vec<(EegFeature, f64)>,
}

impl BaselineRow {
    pub fn new(source_id: impl Into<String>, features: Vec<(EegFeature, f64)>) -> Self {
        Self {
            source_id: source_id.into(),
            features,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn features(&self) -> &[(EegFeature, f64)] {
        &self.features
    }

    pub fn get(&self, feature: EegFeature) -> Option<f64> {
        self.features
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, v)| *v)
    }
}

/// Read-only baseline table. Never empty, so a fallback row always exists.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTable {
    rows: Vec<BaselineRow>,
}

impl BaselineTable {
    pub fn new(rows: Vec<BaselineRow>) -> Result<Self, LoadError> {
        if rows.is_empty() {
            return Err(LoadError::Baseline("table has no rows".to_string()));
        }
        Ok(Self { rows })
    }

    /// Parse CSV with a header row. Empty cells are treated as absent values;
    /// any other non-numeric cell in a recognised column is an error.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| LoadError::Baseline(e.to_string()))?
            .clone();

        let id_index = headers
            .iter()
            .position(|h| h == BASELINE_ID_COLUMN)
            .ok_or_else(|| {
                LoadError::Baseline(format!("missing identifier column '{}'", BASELINE_ID_COLUMN))
            })?;

        let mut columns = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            match EegFeature::from_column(header) {
                Some(feature) => columns.push((index, feature)),
                None if index != id_index => {
                    debug!(column = %header, "Ignoring unrecognised baseline column");
                }
                None => {}
            }
        }

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| LoadError::Baseline(e.to_string()))?;
            let source_id = record.get(id_index).unwrap_or_default().to_string();

            let mut features = Vec::with_capacity(columns.len());
            for &(index, feature) in &columns {
                let cell = record.get(index).unwrap_or_default();
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell.parse().map_err(|_| {
                    LoadError::Baseline(format!(
                        "row {} column '{}': '{}' is not numeric",
                        line + 1,
                        feature.column(),
                        cell
                    ))
                })?;
                features.push((feature, value));
            }

            rows.push(BaselineRow::new(source_id, features));
        }

        Self::new(rows)
    }

    /// Read the table from disk; `Ok(None)` when the file is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file).map(Some)
    }

    /// First row whose identifier contains `profile_id`, else the first row.
    pub fn lookup(&self, profile_id: &str) -> &BaselineRow {
        self.rows
            .iter()
            .find(|row| row.source_id.contains(profile_id))
            .unwrap_or(&self.rows[0])
    }

    pub fn rows(&self) -> &[BaselineRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
