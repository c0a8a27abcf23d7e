use thiserror::Error;

pub type SampleResult<T> = std::result::Result<T, SampleError>;

/// Failures of a single sampling tick. Only `MemoryUnknown` is fatal, and only at startup.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("counter source unavailable: {what}")]
    SourceUnavailable {
        what: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid cpu reading (total delta {total_delta} ticks)")]
    InvalidReading { total_delta: i128 },

    #[error("total system memory is unknown")]
    MemoryUnknown,
}

impl SampleError {
    pub fn source_unavailable(
        what: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        SampleError::SourceUnavailable {
            what,
            source: source.into(),
        }
    }

    /// Whether the tick may still advance process state.
    pub fn is_invalid_reading(&self) -> bool {
        matches!(self, SampleError::InvalidReading { .. })
    }
}
