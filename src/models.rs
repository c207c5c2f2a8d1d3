use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Text-backed enumerations share the same storage/parse/display plumbing.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                match value.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "unknown {} '{}', expected one of: {}",
                        stringify!($name),
                        other,
                        $name::ALL
                            .iter()
                            .map(|value| value.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Activo,
    Inactivo,
    Desertor,
    Graduado,
}

text_enum!(StudentStatus {
    Activo => "activo",
    Inactivo => "inactivo",
    Desertor => "desertor",
    Graduado => "graduado",
});

impl StudentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StudentStatus::Activo => "Activo",
            StudentStatus::Inactivo => "Inactivo",
            StudentStatus::Desertor => "Desertor",
            StudentStatus::Graduado => "Graduado",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Activo,
    Retirado,
    Completado,
}

text_enum!(EnrollmentStatus {
    Activo => "activo",
    Retirado => "retirado",
    Completado => "completado",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Activo,
    Inactivo,
}

text_enum!(AssignmentStatus {
    Activo => "activo",
    Inactivo => "inactivo",
});

/// Stored four-value classification produced by the prediction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Bajo,
    Medio,
    Alto,
    Critico,
}

text_enum!(RiskLevel {
    Bajo => "bajo",
    Medio => "medio",
    Alto => "alto",
    Critico => "critico",
});

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Bajo => "Riesgo Bajo",
            RiskLevel::Medio => "Riesgo Medio",
            RiskLevel::Alto => "Riesgo Alto",
            RiskLevel::Critico => "Riesgo Crítico",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppRole {
    Administrador,
    CoordinadorAcademico,
    Docente,
}

text_enum!(AppRole {
    Administrador => "administrador",
    CoordinadorAcademico => "coordinador_academico",
    Docente => "docente",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeType {
    Parcial1,
    Parcial2,
    Parcial3,
    Final,
    Quiz,
    Taller,
    Proyecto,
    Exposicion,
    Participacion,
}

text_enum!(GradeType {
    Parcial1 => "Parcial 1",
    Parcial2 => "Parcial 2",
    Parcial3 => "Parcial 3",
    Final => "Final",
    Quiz => "Quiz",
    Taller => "Taller",
    Proyecto => "Proyecto",
    Exposicion => "Exposición",
    Participacion => "Participación",
});

/// Three-bucket display label derived from a probability, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    Alto,
    Medio,
    Bajo,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Alto => "Alto",
            RiskLabel::Medio => "Medio",
            RiskLabel::Bajo => "Bajo",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocioeconomicFactors {
    pub family_income: Option<f64>,
    pub parents_education_level: Option<String>,
    pub work_hours_per_week: Option<i32>,
    pub has_scholarship: Option<bool>,
    pub transportation_type: Option<String>,
    pub distance_to_university: Option<f64>,
    pub family_size: Option<i32>,
    pub is_first_generation: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub student_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub program: String,
    pub semester: i32,
    pub enrollment_date: NaiveDate,
    pub status: StudentStatus,
    pub factors: SocioeconomicFactors,
    pub created_by: Option<Uuid>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub program: String,
    pub semester: i32,
    pub credits: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Grade {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub grade: f64,
    pub grade_type: GradeType,
    pub grade_date: NaiveDate,
    pub observations: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attendance {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub attendance_date: NaiveDate,
    pub is_present: bool,
    pub is_late: bool,
    pub observations: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub id: Uuid,
    pub student_id: Uuid,
    pub risk_level: RiskLevel,
    pub probability: f64,
    pub factors_analyzed: serde_json::Value,
    pub model_version: Option<String>,
    pub is_active: bool,
    pub prediction_date: DateTime<Utc>,
}

/// A prediction joined with the identity of the student it describes.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_code: String,
    pub first_name: String,
    pub last_name: String,
    pub risk_level: RiskLevel,
    pub probability: f64,
    pub is_active: bool,
    pub prediction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Explicit session context for writes that record their author.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub profile_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: i64,
    pub at_risk_students: usize,
    pub dropout_prediction: f64,
    pub average_attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEntry {
    pub id: Uuid,
    pub student_code: String,
    pub name: String,
    pub risk: RiskLabel,
    pub probability: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskDistribution {
    pub bajo: usize,
    pub medio: usize,
    pub alto: usize,
}

impl RiskDistribution {
    pub fn total(&self) -> usize {
        self.bajo + self.medio + self.alto
    }

    pub fn count(&self, label: RiskLabel) -> usize {
        match label {
            RiskLabel::Alto => self.alto,
            RiskLabel::Medio => self.medio,
            RiskLabel::Bajo => self.bajo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub recent_risk_students: Vec<RiskEntry>,
    pub distribution: RiskDistribution,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub student_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub program: String,
    pub semester: i32,
    pub enrollment_date: NaiveDate,
    pub status: Option<StudentStatus>,
    pub factors: SocioeconomicFactors,
}

impl NewStudent {
    pub fn validate(&self) -> Result<()> {
        require_text("student_code", &self.student_code)?;
        require_text("first_name", &self.first_name)?;
        require_text("last_name", &self.last_name)?;
        require_text("program", &self.program)?;
        if self.semester < 1 {
            return Err(Error::InvalidInput(format!(
                "semester must be at least 1, got {}",
                self.semester
            )));
        }
        Ok(())
    }
}

/// Profile edit; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub program: Option<String>,
    pub semester: Option<i32>,
    pub enrollment_date: Option<NaiveDate>,
    pub status: Option<StudentStatus>,
    pub factors: SocioeconomicFactors,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.birth_date.is_none()
            && self.gender.is_none()
            && self.address.is_none()
            && self.program.is_none()
            && self.semester.is_none()
            && self.enrollment_date.is_none()
            && self.status.is_none()
            && self.factors == SocioeconomicFactors::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidInput("no student fields to update".to_string()));
        }
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("program", &self.program),
        ] {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }
        if let Some(semester) = self.semester.filter(|semester| *semester < 1) {
            return Err(Error::InvalidInput(format!(
                "semester must be at least 1, got {semester}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewSubject {
    pub code: String,
    pub name: String,
    pub program: String,
    pub semester: i32,
    pub credits: i32,
}

impl NewSubject {
    pub fn validate(&self) -> Result<()> {
        require_text("code", &self.code)?;
        require_text("name", &self.name)?;
        require_text("program", &self.program)?;
        if self.credits < 1 {
            return Err(Error::InvalidInput(format!(
                "credits must be positive, got {}",
                self.credits
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub teacher_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub academic_period: String,
    pub grade: f64,
    pub grade_type: GradeType,
    pub grade_date: NaiveDate,
    pub observations: Option<String>,
}

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 5.0;

impl NewGrade {
    pub fn validate(&self) -> Result<()> {
        require_text("academic_period", &self.academic_period)?;
        if !self.grade.is_finite() || self.grade < MIN_GRADE || self.grade > MAX_GRADE {
            return Err(Error::InvalidInput(format!(
                "grade must be between {MIN_GRADE:.1} and {MAX_GRADE:.1}, got {}",
                self.grade
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub student_id: Uuid,
    pub is_present: bool,
    pub is_late: bool,
    pub observations: Option<String>,
}

/// One submitted roster: every mark shares subject, period and date.
#[derive(Debug, Clone)]
pub struct AttendanceRoster {
    pub subject_id: Uuid,
    pub academic_period: String,
    pub attendance_date: NaiveDate,
    pub marks: Vec<AttendanceMark>,
}

impl AttendanceRoster {
    pub fn validate(&self) -> Result<()> {
        require_text("academic_period", &self.academic_period)?;
        let mut seen = std::collections::HashSet::new();
        for mark in &self.marks {
            if !seen.insert(mark.student_id) {
                return Err(Error::InvalidInput(format!(
                    "student {} appears twice in the roster",
                    mark.student_id
                )));
            }
            if mark.is_late && !mark.is_present {
                return Err(Error::InvalidInput(format!(
                    "student {} cannot be late and absent",
                    mark.student_id
                )));
            }
        }
        Ok(())
    }

    pub fn present_count(&self) -> usize {
        self.marks.iter().filter(|mark| mark.is_present).count()
    }
}

#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub student_id: Uuid,
    pub risk_level: RiskLevel,
    pub probability: f64,
    pub factors_analyzed: serde_json::Value,
    pub model_version: Option<String>,
}

impl NewPrediction {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::InvalidInput(format!(
                "probability must be within [0, 1], got {}",
                self.probability
            )));
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
