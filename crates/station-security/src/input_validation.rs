//! Boundary input validation for the Core API façade: size and format caps
//! independent of the per-metric range checks already enforced at ingest.

use station_common::{CoreError, HealingAction, Result};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_station_id_len: usize,
    pub max_string_field_len: usize,
    pub max_parameters: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_station_id_len: 64,
            max_string_field_len: 4096,
            max_parameters: 64,
        }
    }
}

pub struct InputValidator {
    config: ValidationConfig,
}

impl InputValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn validate_station_id(&self, station_id: &str) -> Result<()> {
        if station_id.is_empty() {
            return Err(CoreError::Validation("station_id must not be empty".into()));
        }
        if station_id.len() > self.config.max_station_id_len {
            warn!(station_id, "station_id exceeds maximum length");
            return Err(CoreError::Validation(format!(
                "station_id exceeds {} bytes",
                self.config.max_station_id_len
            )));
        }
        if !station_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CoreError::Validation(
                "station_id must be alphanumeric with '-' or '_'".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_healing_action(&self, action: &HealingAction) -> Result<()> {
        self.validate_station_id(&action.station_id)?;

        if action.description.len() > self.config.max_string_field_len {
            return Err(CoreError::Validation("description too long".into()));
        }
        if action.parameters.len() > self.config.max_parameters {
            return Err(CoreError::Validation(format!(
                "parameters exceed {} entries",
                self.config.max_parameters
            )));
        }
        for (key, value) in &action.parameters {
            if key.len() > self.config.max_string_field_len || value.len() > self.config.max_string_field_len {
                return Err(CoreError::Validation("parameter field too long".into()));
            }
        }
        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn action(station_id: &str) -> HealingAction {
        HealingAction {
            id: Uuid::new_v4(),
            station_id: station_id.to_string(),
            kind: station_common::ActionKind::ParameterChange,
            parameters: HashMap::new(),
            description: "test".to_string(),
            risk: station_common::Risk::Low,
            source: station_common::ActionSource::Rca,
            source_id: "x".to_string(),
            auto_execute: false,
            timeout: Duration::from_secs(1),
            rollback: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_well_formed_station_id() {
        let validator = InputValidator::default();
        assert!(validator.validate_station_id("station-001").is_ok());
    }

    #[test]
    fn rejects_empty_station_id() {
        let validator = InputValidator::default();
        assert!(validator.validate_station_id("").is_err());
    }

    #[test]
    fn rejects_station_id_with_unsafe_characters() {
        let validator = InputValidator::default();
        assert!(validator.validate_station_id("../etc/passwd").is_err());
    }

    #[test]
    fn rejects_oversized_parameter_maps() {
        let validator = InputValidator::new(ValidationConfig {
            max_parameters: 1,
            ..ValidationConfig::default()
        });
        let mut a = action("S1");
        a.parameters.insert("a".to_string(), "1".to_string());
        a.parameters.insert("b".to_string(), "2".to_string());
        assert!(validator.validate_healing_action(&a).is_err());
    }
}
