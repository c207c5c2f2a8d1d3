use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::DashboardConfig;
use crate::models::{Dashboard, Prediction, RiskDistribution, RiskLabel, Student};

const NOT_RECORDED: &str = "not recorded";

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn write_distribution(output: &mut String, distribution: &RiskDistribution) {
    let total = distribution.total();
    if total == 0 {
        let _ = writeln!(output, "No active predictions recorded.");
        return;
    }
    for label in [RiskLabel::Bajo, RiskLabel::Medio, RiskLabel::Alto] {
        let count = distribution.count(label);
        let _ = writeln!(
            output,
            "- Riesgo {}: {} students ({:.1}%)",
            label,
            count,
            share(count, total)
        );
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Sí"
    } else {
        "No"
    }
}

fn or_missing<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
    match value {
        Some(value) => format!("{value}{unit}"),
        None => NOT_RECORDED.to_string(),
    }
}

/// Student detail card: identity, contact, socioeconomic factors and current risk.
pub fn build_student_profile(student: &Student, prediction: Option<&Prediction>) -> String {
    let factors = &student.factors;
    let mut output = String::new();

    let _ = writeln!(output, "{} ({})", student.full_name(), student.student_code);
    let _ = writeln!(output, "Status: {}", student.status.label());
    let _ = writeln!(output, "Program: {} semester {}", student.program, student.semester);
    let _ = writeln!(output, "Enrolled since: {}", student.enrollment_date);

    let _ = writeln!(output);
    let _ = writeln!(output, "Contact");
    let _ = writeln!(output, "- Email: {}", or_missing(student.email.as_deref(), ""));
    let _ = writeln!(output, "- Phone: {}", or_missing(student.phone.as_deref(), ""));
    let _ = writeln!(output, "- Birth date: {}", or_missing(student.birth_date, ""));
    let _ = writeln!(output, "- Gender: {}", or_missing(student.gender.as_deref(), ""));
    let _ = writeln!(output, "- Address: {}", or_missing(student.address.as_deref(), ""));

    let _ = writeln!(output);
    let _ = writeln!(output, "Socioeconomic factors");
    let _ = writeln!(
        output,
        "- Family income: {}",
        or_missing(factors.family_income.map(|income| format!("{income:.0}")), " COP")
    );
    let _ = writeln!(
        output,
        "- Parents' education: {}",
        or_missing(factors.parents_education_level.as_deref(), "")
    );
    let _ = writeln!(
        output,
        "- Work hours: {} h/week",
        factors.work_hours_per_week.unwrap_or(0)
    );
    let _ = writeln!(
        output,
        "- Scholarship: {}",
        yes_no(factors.has_scholarship.unwrap_or(false))
    );
    let _ = writeln!(
        output,
        "- Transportation: {}",
        or_missing(factors.transportation_type.as_deref(), "")
    );
    let _ = writeln!(
        output,
        "- Distance to university: {}",
        or_missing(factors.distance_to_university, " km")
    );
    let _ = writeln!(
        output,
        "- Family size: {}",
        or_missing(factors.family_size, " people")
    );
    let _ = writeln!(
        output,
        "- First generation: {}",
        yes_no(factors.is_first_generation.unwrap_or(false))
    );

    let _ = writeln!(output);
    match prediction {
        Some(prediction) => {
            let _ = writeln!(
                output,
                "Current risk: {} ({:.1}%, predicted {})",
                prediction.risk_level.label(),
                prediction.probability * 100.0,
                prediction.prediction_date.date_naive()
            );
        }
        None => {
            let _ = writeln!(output, "Current risk: no active prediction");
        }
    }

    output
}

pub fn build_report(
    generated_on: NaiveDate,
    config: &DashboardConfig,
    dashboard: &Dashboard,
) -> String {
    let stats = &dashboard.stats;
    let mut output = String::new();

    let _ = writeln!(output, "# Dropout Early Warning Report");
    let _ = writeln!(
        output,
        "Generated on {} (latest {} predictions, attendance over {} days)",
        generated_on, config.prediction_window, config.attendance_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Active students: {}", stats.total_students);
    let _ = writeln!(output, "- At-risk students: {}", stats.at_risk_students);
    let _ = writeln!(
        output,
        "- Mean dropout probability: {:.2}",
        stats.dropout_prediction
    );
    let _ = writeln!(
        output,
        "- Average attendance: {:.1}%",
        stats.average_attendance
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");
    write_distribution(&mut output, &dashboard.distribution);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Risk Students");

    if dashboard.recent_risk_students.is_empty() {
        let _ = writeln!(output, "No active predictions recorded.");
    } else {
        for entry in &dashboard.recent_risk_students {
            let _ = writeln!(
                output,
                "- {} ({}) riesgo {} at {}%",
                entry.name, entry.student_code, entry.risk, entry.probability
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DashboardStats, RiskEntry, RiskLevel, SocioeconomicFactors, StudentStatus};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn student(factors: SocioeconomicFactors) -> Student {
        Student {
            id: Uuid::new_v4(),
            student_code: "2024001".to_string(),
            first_name: "Juan".to_string(),
            last_name: "Pérez".to_string(),
            email: Some("juan.perez@email.com".to_string()),
            phone: None,
            birth_date: NaiveDate::from_ymd_opt(1999, 5, 15),
            gender: Some("masculino".to_string()),
            address: Some("Calle 123 #45-67".to_string()),
            program: "Ingeniería de Sistemas".to_string(),
            semester: 3,
            enrollment_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: StudentStatus::Activo,
            factors,
            created_by: None,
        }
    }

    fn empty_dashboard() -> Dashboard {
        Dashboard {
            stats: DashboardStats {
                total_students: 0,
                at_risk_students: 0,
                dropout_prediction: 0.0,
                average_attendance: 85.3,
            },
            recent_risk_students: Vec::new(),
            distribution: RiskDistribution::default(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn empty_dashboard_renders_placeholders() {
        let report = build_report(date(), &DashboardConfig::default(), &empty_dashboard());
        assert!(report.starts_with("# Dropout Early Warning Report"));
        assert!(report.contains("Generated on 2024-03-14 (latest 5 predictions, attendance over 30 days)"));
        assert!(report.contains("- Average attendance: 85.3%"));
        assert_eq!(report.matches("No active predictions recorded.").count(), 2);
    }

    #[test]
    fn lists_recent_risk_in_given_order() {
        let mut dashboard = empty_dashboard();
        dashboard.stats.at_risk_students = 1;
        dashboard.stats.dropout_prediction = 0.58;
        dashboard.distribution = RiskDistribution {
            bajo: 2,
            medio: 1,
            alto: 1,
        };
        dashboard.recent_risk_students = vec![
            RiskEntry {
                id: Uuid::new_v4(),
                student_code: "2024002".to_string(),
                name: "María García".to_string(),
                risk: RiskLabel::Medio,
                probability: 65,
            },
            RiskEntry {
                id: Uuid::new_v4(),
                student_code: "2024001".to_string(),
                name: "Juan Pérez".to_string(),
                risk: RiskLabel::Alto,
                probability: 85,
            },
        ];

        let report = build_report(date(), &DashboardConfig::default(), &dashboard);
        assert!(report.contains("- Mean dropout probability: 0.58"));
        assert!(report.contains("- Riesgo Bajo: 2 students (50.0%)"));
        assert!(report.contains("- Riesgo Alto: 1 students (25.0%)"));

        let maria = report.find("María García (2024002) riesgo Medio at 65%").unwrap();
        let juan = report.find("Juan Pérez (2024001) riesgo Alto at 85%").unwrap();
        assert!(maria < juan);
    }

    #[test]
    fn student_profile_lists_contact_and_factors() {
        let profile = build_student_profile(
            &student(SocioeconomicFactors {
                family_income: Some(2_000_000.0),
                parents_education_level: Some("universitario".to_string()),
                work_hours_per_week: Some(20),
                has_scholarship: Some(true),
                transportation_type: Some("publico".to_string()),
                distance_to_university: Some(15.5),
                family_size: Some(4),
                is_first_generation: Some(false),
            }),
            None,
        );

        assert!(profile.starts_with("Juan Pérez (2024001)\n"));
        assert!(profile.contains("- Email: juan.perez@email.com"));
        assert!(profile.contains("- Phone: not recorded"));
        assert!(profile.contains("- Birth date: 1999-05-15"));
        assert!(profile.contains("- Address: Calle 123 #45-67"));
        assert!(profile.contains("- Family income: 2000000 COP"));
        assert!(profile.contains("- Parents' education: universitario"));
        assert!(profile.contains("- Work hours: 20 h/week"));
        assert!(profile.contains("- Scholarship: Sí"));
        assert!(profile.contains("- Distance to university: 15.5 km"));
        assert!(profile.contains("- Family size: 4 people"));
        assert!(profile.contains("- First generation: No"));
        assert!(profile.contains("Current risk: no active prediction"));
    }

    #[test]
    fn student_profile_shows_probability_to_one_decimal() {
        let prediction = Prediction {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            risk_level: RiskLevel::Critico,
            probability: 0.856,
            factors_analyzed: serde_json::json!({}),
            model_version: None,
            is_active: true,
            prediction_date: Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap(),
        };
        let profile = build_student_profile(
            &student(SocioeconomicFactors::default()),
            Some(&prediction),
        );

        assert!(profile.contains("Current risk: Riesgo Crítico (85.6%, predicted 2024-03-14)"));
        assert!(profile.contains("- Family income: not recorded"));
        assert!(profile.contains("- Work hours: 0 h/week"));
        assert!(profile.contains("- Scholarship: No"));
    }
}
