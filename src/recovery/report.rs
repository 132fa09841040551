//! Integrity reports and recommendations
//!
//! Produced fresh on each check, never persisted.

use serde::{Deserialize, Serialize};

/// Which layer detected the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionType {
    /// Checksum mismatch or unparsable record
    Structure,
    /// Record verifies but its data fails validation rules
    Schema,
}

/// Suggested next step for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    None,
    RestoreBackup,
    ManualReview,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::None => "none",
            RecommendedAction::RestoreBackup => "restore_backup",
            RecommendedAction::ManualReview => "manual_review",
        }
    }
}

/// Result of checking one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub key: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption_type: Option<CorruptionType>,
    /// Backups whose own digests still match
    pub available_backups: usize,
    pub recommended_action: RecommendedAction,
}

impl IntegrityReport {
    pub fn valid(key: &str, warnings: Vec<String>, available_backups: usize) -> Self {
        Self {
            key: key.to_string(),
            is_valid: true,
            errors: Vec::new(),
            warnings,
            corruption_type: None,
            available_backups,
            recommended_action: RecommendedAction::None,
        }
    }

    /// Invalid report; the action follows from the corruption type and
    /// whether any valid backup exists
    pub fn invalid(
        key: &str,
        errors: Vec<String>,
        warnings: Vec<String>,
        corruption_type: Option<CorruptionType>,
        available_backups: usize,
    ) -> Self {
        let recommended_action = match (corruption_type, available_backups) {
            (Some(CorruptionType::Schema), _) => RecommendedAction::ManualReview,
            (_, 0) => RecommendedAction::ManualReview,
            _ => RecommendedAction::RestoreBackup,
        };
        Self {
            key: key.to_string(),
            is_valid: false,
            errors,
            warnings,
            corruption_type,
            available_backups,
            recommended_action,
        }
    }

    pub fn is_schema_error(&self) -> bool {
        self.corruption_type == Some(CorruptionType::Schema)
    }
}

/// Overall state across checked keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

impl OverallStatus {
    /// Classify by the fraction of invalid keys
    pub fn from_invalid_fraction(fraction: f64) -> Self {
        if fraction < 0.1 {
            OverallStatus::Healthy
        } else if fraction < 0.5 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// One suggested action in a recommendation set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAction {
    pub key: String,
    pub action: RecommendedAction,
    pub reason: String,
}

/// Output of `RecoveryCoordinator::recommendations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecommendations {
    pub overall: OverallStatus,
    pub urgency: Urgency,
    pub total_keys: usize,
    pub invalid_keys: usize,
    /// Keys failing validation rules; these cannot be healed automatically
    pub schema_errors: usize,
    pub actions: Vec<KeyAction>,
    pub reports: Vec<IntegrityReport>,
}

impl RecoveryRecommendations {
    pub fn from_reports(reports: Vec<IntegrityReport>) -> Self {
        let total_keys = reports.len();
        let invalid_keys = reports.iter().filter(|r| !r.is_valid).count();
        let schema_errors = reports.iter().filter(|r| r.is_schema_error()).count();

        let fraction = if total_keys == 0 {
            0.0
        } else {
            invalid_keys as f64 / total_keys as f64
        };
        let overall = OverallStatus::from_invalid_fraction(fraction);

        let urgency = if schema_errors > 0 {
            Urgency::High
        } else {
            match overall {
                OverallStatus::Healthy => Urgency::Low,
                OverallStatus::Degraded => Urgency::Medium,
                OverallStatus::Critical => Urgency::High,
            }
        };

        let actions = reports
            .iter()
            .filter(|r| r.recommended_action != RecommendedAction::None)
            .map(|r| KeyAction {
                key: r.key.clone(),
                action: r.recommended_action,
                reason: r.errors.join("; "),
            })
            .collect();

        Self {
            overall,
            urgency,
            total_keys,
            invalid_keys,
            schema_errors,
            actions,
            reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrupt(key: &str) -> IntegrityReport {
        IntegrityReport::invalid(
            key,
            vec!["checksum mismatch".into()],
            vec![],
            Some(CorruptionType::Structure),
            1,
        )
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(OverallStatus::from_invalid_fraction(0.0), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_invalid_fraction(0.09), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_invalid_fraction(0.1), OverallStatus::Degraded);
        assert_eq!(OverallStatus::from_invalid_fraction(0.3), OverallStatus::Degraded);
        assert_eq!(OverallStatus::from_invalid_fraction(0.5), OverallStatus::Critical);
    }

    #[test]
    fn test_seven_of_ten_valid_is_degraded() {
        let mut reports: Vec<_> = (0..7)
            .map(|i| IntegrityReport::valid(&format!("k{}", i), vec![], 1))
            .collect();
        reports.extend((7..10).map(|i| corrupt(&format!("k{}", i))));

        let recs = RecoveryRecommendations::from_reports(reports);
        assert_eq!(recs.overall, OverallStatus::Degraded);
        assert_eq!(recs.urgency, Urgency::Medium);
        assert_eq!(recs.actions.len(), 3);
        assert!(recs
            .actions
            .iter()
            .all(|a| a.action == RecommendedAction::RestoreBackup));
    }

    #[test]
    fn test_schema_error_forces_high_urgency() {
        let mut reports: Vec<_> = (0..19)
            .map(|i| IntegrityReport::valid(&format!("k{}", i), vec![], 0))
            .collect();
        reports.push(IntegrityReport::invalid(
            "bad",
            vec!["missing required field 'id'".into()],
            vec![],
            Some(CorruptionType::Schema),
            2,
        ));
        let recs = RecoveryRecommendations::from_reports(reports);
        assert_eq!(recs.overall, OverallStatus::Healthy);
        assert_eq!(recs.urgency, Urgency::High);
        assert_eq!(recs.actions[0].action, RecommendedAction::ManualReview);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(corrupt("k")).unwrap();
        assert_eq!(json["corruptionType"], "structure");
        assert_eq!(json["recommendedAction"], "restore_backup");
        assert_eq!(json["isValid"], false);
    }
}
