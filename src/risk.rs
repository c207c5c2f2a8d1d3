use std::collections::HashMap;

use crate::config::{DashboardConfig, AT_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD};
use crate::error::{Error, Result};
use crate::models::{
    Attendance, Dashboard, DashboardStats, PredictionRecord, RiskDistribution, RiskEntry,
    RiskLabel,
};

/// Upper bounds are inclusive toward the lower label: 0.70 is `Medio`,
/// 0.40 is `Bajo`.
pub fn classify_risk(probability: f64) -> RiskLabel {
    if probability > AT_RISK_THRESHOLD {
        RiskLabel::Alto
    } else if probability > MEDIUM_RISK_THRESHOLD {
        RiskLabel::Medio
    } else {
        RiskLabel::Bajo
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Percentage of present marks, `None` when there is nothing to average.
pub fn attendance_rate(records: &[Attendance]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let present = records.iter().filter(|record| record.is_present).count();
    Some(100.0 * present as f64 / records.len() as f64)
}

pub fn compute_dashboard_stats(
    config: &DashboardConfig,
    active_student_count: i64,
    recent_predictions: &[PredictionRecord],
    recent_attendance: &[Attendance],
) -> Result<DashboardStats> {
    validate_predictions(recent_predictions)?;

    let at_risk_students = recent_predictions
        .iter()
        .filter(|prediction| prediction.probability > AT_RISK_THRESHOLD)
        .count();

    let dropout_prediction = if recent_predictions.is_empty() {
        0.0
    } else {
        let total: f64 = recent_predictions.iter().map(|p| p.probability).sum();
        round_to(total / recent_predictions.len() as f64, 2)
    };

    let average_attendance = match attendance_rate(recent_attendance) {
        Some(rate) => round_to(rate, 1),
        None => config.attendance_fallback,
    };

    Ok(DashboardStats {
        total_students: active_student_count,
        at_risk_students,
        dropout_prediction,
        average_attendance,
    })
}

/// Display projection in input order; severity never reorders entries.
pub fn rank_recent_risk(predictions: &[PredictionRecord]) -> Result<Vec<RiskEntry>> {
    validate_predictions(predictions)?;

    Ok(predictions
        .iter()
        .map(|prediction| RiskEntry {
            id: prediction.student_id,
            student_code: prediction.student_code.clone(),
            name: format!("{} {}", prediction.first_name, prediction.last_name),
            risk: classify_risk(prediction.probability),
            probability: (prediction.probability * 100.0).round() as i64,
        })
        .collect())
}

/// Keeps the latest active prediction per student, newest first, at most
/// `window` entries.
pub fn current_predictions(predictions: &[PredictionRecord], window: usize) -> Vec<PredictionRecord> {
    let mut latest: HashMap<uuid::Uuid, &PredictionRecord> = HashMap::new();

    for prediction in predictions.iter().filter(|p| p.is_active) {
        match latest.get(&prediction.student_id) {
            Some(existing) if existing.prediction_date >= prediction.prediction_date => {}
            _ => {
                latest.insert(prediction.student_id, prediction);
            }
        }
    }

    let mut values: Vec<PredictionRecord> = latest.into_values().cloned().collect();
    values.sort_by(|a, b| {
        b.prediction_date
            .cmp(&a.prediction_date)
            .then_with(|| a.student_code.cmp(&b.student_code))
    });
    values.truncate(window);
    values
}

pub fn risk_distribution(predictions: &[PredictionRecord]) -> Result<RiskDistribution> {
    validate_predictions(predictions)?;

    let mut distribution = RiskDistribution::default();
    for prediction in predictions {
        match classify_risk(prediction.probability) {
            RiskLabel::Alto => distribution.alto += 1,
            RiskLabel::Medio => distribution.medio += 1,
            RiskLabel::Bajo => distribution.bajo += 1,
        }
    }
    Ok(distribution)
}

/// One dashboard refresh over rows the caller already fetched.
pub fn build_dashboard(
    config: &DashboardConfig,
    active_student_count: i64,
    active_predictions: &[PredictionRecord],
    recent_attendance: &[Attendance],
) -> Result<Dashboard> {
    let current = current_predictions(active_predictions, usize::MAX);
    let window = &current[..current.len().min(config.prediction_window)];

    Ok(Dashboard {
        stats: compute_dashboard_stats(config, active_student_count, window, recent_attendance)?,
        recent_risk_students: rank_recent_risk(window)?,
        distribution: risk_distribution(&current)?,
    })
}

fn validate_predictions(predictions: &[PredictionRecord]) -> Result<()> {
    for prediction in predictions {
        if let Err(err) = validate_prediction(prediction) {
            tracing::error!(prediction_id = %prediction.id, "{err}");
            return Err(err);
        }
    }
    Ok(())
}

fn validate_prediction(prediction: &PredictionRecord) -> Result<()> {
    if !(0.0..=1.0).contains(&prediction.probability) {
        return Err(Error::InvalidProbability {
            prediction_id: prediction.id,
            probability: prediction.probability,
        });
    }
    for (field, value) in [
        ("student_code", &prediction.student_code),
        ("first_name", &prediction.first_name),
        ("last_name", &prediction.last_name),
    ] {
        if value.trim().is_empty() {
            return Err(Error::MissingField {
                prediction_id: prediction.id,
                field,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ATTENDANCE_FALLBACK;
    use crate::models::RiskLevel;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn prediction(code: &str, probability: f64, predicted_at: DateTime<Utc>) -> PredictionRecord {
        PredictionRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_code: code.to_string(),
            first_name: "Juan".to_string(),
            last_name: "Pérez".to_string(),
            risk_level: RiskLevel::Medio,
            probability,
            is_active: true,
            prediction_date: predicted_at,
        }
    }

    fn window(probabilities: &[f64]) -> Vec<PredictionRecord> {
        probabilities
            .iter()
            .enumerate()
            .map(|(i, p)| prediction(&format!("2024{:03}", i + 1), *p, at(20 - i as u32, 9)))
            .collect()
    }

    fn attendance(present: usize, absent: usize) -> Vec<Attendance> {
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        (0..present + absent)
            .map(|i| Attendance {
                id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                subject_id: Uuid::new_v4(),
                academic_period: "2024-1".to_string(),
                attendance_date: date,
                is_present: i < present,
                is_late: false,
                observations: None,
                created_by: Uuid::new_v4(),
            })
            .collect()
    }

    #[test]
    fn classification_boundaries_lean_to_the_lower_label() {
        assert_eq!(classify_risk(0.70), RiskLabel::Medio);
        assert_eq!(classify_risk(0.7000001), RiskLabel::Alto);
        assert_eq!(classify_risk(0.40), RiskLabel::Bajo);
        assert_eq!(classify_risk(0.4000001), RiskLabel::Medio);
        assert_eq!(classify_risk(0.0), RiskLabel::Bajo);
        assert_eq!(classify_risk(1.0), RiskLabel::Alto);
    }

    #[test]
    fn classification_is_total() {
        for step in 0..=1000 {
            let label = classify_risk(step as f64 / 1000.0);
            assert!(matches!(label, RiskLabel::Alto | RiskLabel::Medio | RiskLabel::Bajo));
        }
        assert_eq!(classify_risk(f64::NAN), RiskLabel::Bajo);
    }

    #[test]
    fn stats_over_mixed_window() {
        let config = DashboardConfig::default();
        let stats =
            compute_dashboard_stats(&config, 42, &window(&[0.85, 0.65, 0.25]), &attendance(17, 3))
                .unwrap();
        assert_eq!(stats.total_students, 42);
        assert_eq!(stats.at_risk_students, 1);
        assert_eq!(stats.dropout_prediction, 0.58);
        assert_eq!(stats.average_attendance, 85.0);
    }

    #[test]
    fn empty_prediction_window_yields_zeroes() {
        let config = DashboardConfig::default();
        let stats = compute_dashboard_stats(&config, 0, &[], &attendance(1, 1)).unwrap();
        assert_eq!(stats.at_risk_students, 0);
        assert_eq!(stats.dropout_prediction, 0.0);
        assert_eq!(stats.average_attendance, 50.0);
    }

    #[test]
    fn empty_attendance_uses_documented_fallback() {
        let config = DashboardConfig::default();
        let stats = compute_dashboard_stats(&config, 3, &window(&[0.5]), &[]).unwrap();
        assert_eq!(stats.average_attendance, 85.3);
        assert_eq!(DEFAULT_ATTENDANCE_FALLBACK, 85.3);
    }

    #[test]
    fn empty_attendance_fallback_is_configurable() {
        let config = DashboardConfig {
            attendance_fallback: 0.0,
            ..DashboardConfig::default()
        };
        let stats = compute_dashboard_stats(&config, 3, &[], &[]).unwrap();
        assert_eq!(stats.average_attendance, 0.0);
    }

    #[test]
    fn attendance_rate_rounds_to_one_decimal() {
        assert_eq!(attendance_rate(&[]), None);
        let config = DashboardConfig::default();
        let stats = compute_dashboard_stats(&config, 0, &[], &attendance(2, 1)).unwrap();
        assert_eq!(stats.average_attendance, 66.7);
    }

    #[test]
    fn stats_are_idempotent() {
        let config = DashboardConfig::default();
        let predictions = window(&[0.91, 0.33, 0.72, 0.18]);
        let records = attendance(11, 4);
        let first = compute_dashboard_stats(&config, 9, &predictions, &records).unwrap();
        let second = compute_dashboard_stats(&config, 9, &predictions, &records).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.dropout_prediction.to_bits(),
            second.dropout_prediction.to_bits()
        );
        assert_eq!(
            first.average_attendance.to_bits(),
            second.average_attendance.to_bits()
        );
    }

    #[test]
    fn out_of_range_probability_fails_fast() {
        let config = DashboardConfig::default();
        let bad = window(&[0.3, 1.2]);
        let err = compute_dashboard_stats(&config, 2, &bad, &[]).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(matches!(err, Error::InvalidProbability { probability, .. } if probability == 1.2));
        assert!(rank_recent_risk(&window(&[-0.1])).is_err());
        assert!(rank_recent_risk(&window(&[f64::NAN])).is_err());
    }

    #[test]
    fn blank_identity_is_a_missing_field() {
        let mut rows = window(&[0.5]);
        rows[0].student_code = "  ".to_string();
        let err = rank_recent_risk(&rows).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "student_code", .. }));
    }

    #[test]
    fn recent_risk_preserves_input_order() {
        let rows = window(&[0.25, 0.95, 0.55]);
        let entries = rank_recent_risk(&rows).unwrap();
        let codes: Vec<&str> = entries.iter().map(|e| e.student_code.as_str()).collect();
        assert_eq!(codes, vec!["2024001", "2024002", "2024003"]);
        let risks: Vec<RiskLabel> = entries.iter().map(|e| e.risk).collect();
        assert_eq!(risks, vec![RiskLabel::Bajo, RiskLabel::Alto, RiskLabel::Medio]);
    }

    #[test]
    fn recent_risk_projects_display_fields() {
        let rows = window(&[0.876]);
        let entry = &rank_recent_risk(&rows).unwrap()[0];
        assert_eq!(entry.id, rows[0].student_id);
        assert_eq!(entry.name, "Juan Pérez");
        assert_eq!(entry.probability, 88);
        assert_eq!(entry.risk, RiskLabel::Alto);
    }

    #[test]
    fn current_predictions_keep_latest_active_per_student() {
        let student = Uuid::new_v4();
        let mut old = prediction("2024001", 0.9, at(1, 8));
        old.student_id = student;
        let mut newer = prediction("2024001", 0.3, at(10, 8));
        newer.student_id = student;
        let mut retired = prediction("2024001", 0.99, at(12, 8));
        retired.student_id = student;
        retired.is_active = false;
        let other = prediction("2024002", 0.6, at(5, 8));

        let current = current_predictions(&[old, other.clone(), newer.clone(), retired], 10);
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].id, newer.id);
        assert_eq!(current[1].id, other.id);
    }

    #[test]
    fn current_predictions_respect_window() {
        let rows: Vec<PredictionRecord> = (1..=8)
            .map(|day| prediction(&format!("s{day}"), 0.5, at(day, 12)))
            .collect();
        let current = current_predictions(&rows, 5);
        assert_eq!(current.len(), 5);
        assert_eq!(current[0].student_code, "s8");
        assert_eq!(current[4].student_code, "s4");
    }

    #[test]
    fn distribution_counts_display_buckets() {
        let distribution = risk_distribution(&window(&[0.95, 0.71, 0.7, 0.41, 0.4, 0.1])).unwrap();
        assert_eq!(distribution.alto, 2);
        assert_eq!(distribution.medio, 2);
        assert_eq!(distribution.bajo, 2);
        assert_eq!(distribution.total(), 6);
    }

    #[test]
    fn dashboard_windows_stats_but_not_distribution() {
        let config = DashboardConfig {
            prediction_window: 2,
            ..DashboardConfig::default()
        };
        let rows = window(&[0.9, 0.8, 0.1, 0.2]);
        let dashboard = build_dashboard(&config, 4, &rows, &attendance(3, 1)).unwrap();
        assert_eq!(dashboard.recent_risk_students.len(), 2);
        assert_eq!(dashboard.stats.at_risk_students, 2);
        assert_eq!(dashboard.stats.dropout_prediction, 0.85);
        assert_eq!(dashboard.stats.average_attendance, 75.0);
        assert_eq!(dashboard.distribution.total(), 4);
        assert_eq!(dashboard.distribution.bajo, 2);
    }
}
