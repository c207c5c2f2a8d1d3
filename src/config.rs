use chrono::{Duration, NaiveDate};
use clap::Args;

use crate::error::{Error, Result};

/// Shown as the attendance average when the window holds no records.
pub const DEFAULT_ATTENDANCE_FALLBACK: f64 = 85.3;
pub const DEFAULT_PREDICTION_WINDOW: usize = 5;
pub const DEFAULT_ATTENDANCE_DAYS: i64 = 30;
/// Probabilities strictly above this count as at-risk.
pub const AT_RISK_THRESHOLD: f64 = 0.70;
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.40;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub prediction_window: usize,
    pub attendance_days: i64,
    pub attendance_fallback: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            prediction_window: DEFAULT_PREDICTION_WINDOW,
            attendance_days: DEFAULT_ATTENDANCE_DAYS,
            attendance_fallback: DEFAULT_ATTENDANCE_FALLBACK,
        }
    }
}

impl DashboardConfig {
    /// First day included in the attendance average when refreshing on `today`.
    pub fn attendance_cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.attendance_days.max(1))
    }
}

#[derive(Args, Debug, Clone)]
pub struct DashboardArgs {
    /// Number of most recent active predictions feeding the dashboard
    #[arg(long, env = "DROPOUT_PREDICTION_WINDOW", default_value_t = DEFAULT_PREDICTION_WINDOW)]
    pub prediction_window: usize,
    /// Trailing window of attendance records, in days
    #[arg(long, env = "DROPOUT_ATTENDANCE_DAYS", default_value_t = DEFAULT_ATTENDANCE_DAYS)]
    pub attendance_days: i64,
    /// Attendance percentage displayed when no records exist in the window
    #[arg(long, env = "DROPOUT_ATTENDANCE_FALLBACK", default_value_t = DEFAULT_ATTENDANCE_FALLBACK)]
    pub attendance_fallback: f64,
}

impl DashboardArgs {
    pub fn into_config(self) -> Result<DashboardConfig> {
        if self.prediction_window == 0 {
            return Err(Error::InvalidInput(
                "prediction window must hold at least one prediction".to_string(),
            ));
        }
        if self.attendance_days < 1 {
            return Err(Error::InvalidInput(format!(
                "attendance window must be at least one day, got {}",
                self.attendance_days
            )));
        }
        if !(0.0..=100.0).contains(&self.attendance_fallback) {
            return Err(Error::InvalidInput(format!(
                "attendance fallback must be a percentage, got {}",
                self.attendance_fallback
            )));
        }
        Ok(DashboardConfig {
            prediction_window: self.prediction_window,
            attendance_days: self.attendance_days,
            attendance_fallback: self.attendance_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(window: usize, days: i64, fallback: f64) -> DashboardArgs {
        DashboardArgs {
            prediction_window: window,
            attendance_days: days,
            attendance_fallback: fallback,
        }
    }

    #[test]
    fn defaults_match_dashboard_policy() {
        let config = DashboardConfig::default();
        assert_eq!(config.prediction_window, 5);
        assert_eq!(config.attendance_days, 30);
        assert_eq!(config.attendance_fallback, 85.3);
    }

    #[test]
    fn args_convert_into_config() {
        let config = args(10, 14, 0.0).into_config().unwrap();
        assert_eq!(config.prediction_window, 10);
        assert_eq!(config.attendance_days, 14);
        assert_eq!(config.attendance_fallback, 0.0);
    }

    #[test]
    fn attendance_cutoff_counts_back_from_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let config = DashboardConfig::default();
        assert_eq!(
            config.attendance_cutoff(today),
            NaiveDate::from_ymd_opt(2024, 2, 13).unwrap()
        );

        let narrow = args(5, 7, 85.3).into_config().unwrap();
        assert_eq!(
            narrow.attendance_cutoff(today),
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
        );
    }

    #[test]
    fn rejects_degenerate_windows() {
        assert!(args(0, 30, 85.3).into_config().is_err());
        assert!(args(5, 0, 85.3).into_config().is_err());
        assert!(args(5, 30, 120.0).into_config().is_err());
    }
}
