use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum LandUseError {
    #[error("{0}")]
    Error(String),
    #[error("negative land allocation of {value} read in for leaf {leaf} in {region} (period {period})")]
    NegativeLandAllocation {
        leaf: String,
        region: String,
        period: usize,
        value: f64,
    },
    #[error("no land use history read in for leaf {leaf} in region {region}")]
    MissingLandUseHistory { leaf: String, region: String },
    #[error("uninitialized profit scaler in period {period} for leaf {leaf} in region {region}. Calibration data must seed the first active periods explicitly.")]
    UninitializedProfitScaler {
        leaf: String,
        region: String,
        period: usize,
    },
    #[error("no market for {good} in region {region}")]
    MissingMarket { good: String, region: String },
    #[error("invalid model calendar: {0}")]
    InvalidCalendar(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience type for `Result<T, LandUseError>`.
pub type LandUseResult<T> = Result<T, LandUseError>;
