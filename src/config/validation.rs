use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    #[error("quota.warning_threshold must be within 1..=100, got {value}")]
    ThresholdOutOfRange { value: f64 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_ingest(config)?;
    validate_retention(config)?;
    validate_quota(config)?;
    validate_sessions(config)?;
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::MustBePositive { field });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    positive("server.max_payload_bytes", config.server.max_payload_bytes.as_u64())
}

fn validate_ingest(config: &Config) -> Result<(), ValidationError> {
    positive("ingest.flush_delay_ms", config.ingest.flush_delay_ms)?;
    positive(
        "ingest.max_consecutive_failures",
        u64::from(config.ingest.max_consecutive_failures),
    )
}

/// Unset limits are allowed; a limit of zero is not
fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    let retention = &config.retention;
    if let Some(days) = retention.max_age_days {
        positive("retention.max_age_days", u64::from(days))?;
    }
    if let Some(size) = retention.max_size {
        positive("retention.max_size", size.as_u64())?;
    }
    if let Some(entries) = retention.max_entries {
        positive("retention.max_entries", entries)?;
    }
    Ok(())
}

fn validate_quota(config: &Config) -> Result<(), ValidationError> {
    if let Some(total) = config.quota.total {
        positive("quota.total", total.as_u64())?;
    }
    let threshold = config.quota.warning_threshold;
    if !(1.0..=100.0).contains(&threshold) {
        return Err(ValidationError::ThresholdOutOfRange { value: threshold });
    }
    Ok(())
}

fn validate_sessions(config: &Config) -> Result<(), ValidationError> {
    positive("sessions.max_idle_secs", config.sessions.max_idle_secs)?;
    positive("sessions.sweep_interval_secs", config.sessions.sweep_interval_secs)
}
