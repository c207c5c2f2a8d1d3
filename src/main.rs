use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::PgPool;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod models;
mod report;
mod repository;
mod risk;

use config::{DashboardArgs, DashboardConfig};
use models::{
    Actor, AppRole, AssignmentStatus, Attendance, AttendanceMark, AttendanceRoster, Dashboard,
    EnrollmentStatus, GradeType, NewAssignment, NewEnrollment, NewGrade, NewPrediction,
    NewStudent, NewSubject, PredictionRecord, RiskLevel, SocioeconomicFactors, Student,
    StudentStatus, StudentUpdate, Subject,
};

#[derive(Parser)]
#[command(name = "dropout-early-warning")]
#[command(about = "Student dropout risk tracking for academic coordinators", long_about = None)]
#[command(version)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "DROPOUT_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Profile id recorded as the author of grades and attendance
    #[arg(long, env = "DROPOUT_ACTOR_ID", global = true)]
    actor: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import students from a CSV file using the import template columns
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show dashboard statistics and the recent risk list
    Dashboard {
        #[command(flatten)]
        window: DashboardArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate a markdown dashboard report
    Report {
        #[command(flatten)]
        window: DashboardArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    #[command(subcommand)]
    Students(StudentCommand),
    #[command(subcommand)]
    Subjects(SubjectCommand),
    #[command(subcommand)]
    Profiles(ProfileCommand),
    #[command(subcommand)]
    Enrollments(EnrollmentCommand),
    #[command(subcommand)]
    Assignments(AssignmentCommand),
    #[command(subcommand)]
    Grades(GradeCommand),
    #[command(subcommand)]
    Attendance(AttendanceCommand),
    #[command(subcommand)]
    Predictions(PredictionCommand),
}

#[derive(Args, Debug, Default)]
struct ContactArgs {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    birth_date: Option<NaiveDate>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args, Debug, Default)]
struct FactorArgs {
    /// Monthly family income in COP
    #[arg(long)]
    family_income: Option<f64>,
    #[arg(long)]
    parents_education_level: Option<String>,
    #[arg(long)]
    work_hours_per_week: Option<i32>,
    #[arg(long)]
    has_scholarship: Option<bool>,
    #[arg(long)]
    transportation_type: Option<String>,
    /// Kilometres from home to campus
    #[arg(long)]
    distance_to_university: Option<f64>,
    #[arg(long)]
    family_size: Option<i32>,
    #[arg(long)]
    is_first_generation: Option<bool>,
}

impl From<FactorArgs> for SocioeconomicFactors {
    fn from(args: FactorArgs) -> Self {
        Self {
            family_income: args.family_income,
            parents_education_level: args.parents_education_level,
            work_hours_per_week: args.work_hours_per_week,
            has_scholarship: args.has_scholarship,
            transportation_type: args.transportation_type,
            distance_to_university: args.distance_to_university,
            family_size: args.family_size,
            is_first_generation: args.is_first_generation,
        }
    }
}

#[derive(Subcommand)]
enum StudentCommand {
    List {
        #[arg(long)]
        status: Option<StudentStatus>,
    },
    /// Show a student profile with the current risk prediction
    Show { code: String },
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        program: String,
        #[arg(long)]
        semester: i32,
        #[arg(long)]
        enrollment_date: NaiveDate,
        #[arg(long)]
        status: Option<StudentStatus>,
        #[command(flatten)]
        contact: ContactArgs,
        #[command(flatten)]
        factors: FactorArgs,
    },
    /// Edit profile fields; omitted flags keep their stored values
    Edit {
        code: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        semester: Option<i32>,
        #[arg(long)]
        enrollment_date: Option<NaiveDate>,
        #[arg(long)]
        status: Option<StudentStatus>,
        #[command(flatten)]
        contact: ContactArgs,
        #[command(flatten)]
        factors: FactorArgs,
    },
    SetStatus {
        code: String,
        status: StudentStatus,
    },
    Delete { code: String },
}

#[derive(Subcommand)]
enum SubjectCommand {
    List {
        #[arg(long)]
        program: Option<String>,
    },
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        program: String,
        #[arg(long)]
        semester: i32,
        #[arg(long)]
        credits: i32,
    },
    Delete { code: String },
}

#[derive(Subcommand)]
enum ProfileCommand {
    List {
        #[arg(long)]
        role: Option<AppRole>,
    },
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        role: AppRole,
    },
}

#[derive(Subcommand)]
enum EnrollmentCommand {
    List {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        period: Option<String>,
    },
    Add {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        period: String,
        #[arg(long, default_value = "activo")]
        status: EnrollmentStatus,
    },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum AssignmentCommand {
    List {
        #[arg(long)]
        teacher: Option<Uuid>,
        #[arg(long)]
        period: Option<String>,
    },
    Add {
        #[arg(long)]
        teacher: Uuid,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        period: String,
        #[arg(long, default_value = "activo")]
        status: AssignmentStatus,
    },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum GradeCommand {
    List {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        subject: Option<String>,
    },
    Add {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        period: String,
        #[arg(long)]
        grade: f64,
        /// One of: Parcial 1, Parcial 2, Parcial 3, Final, Quiz, Taller, Proyecto,
        /// Exposición, Participación
        #[arg(long)]
        grade_type: GradeType,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum AttendanceCommand {
    List {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record a roster; enrolled students not listed as present are absent
    Record {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        period: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Student codes marked present
        #[arg(long, value_delimiter = ',')]
        present: Vec<String>,
        /// Student codes marked present but late
        #[arg(long, value_delimiter = ',')]
        late: Vec<String>,
    },
}

#[derive(Subcommand)]
enum PredictionCommand {
    /// Store a model prediction for a student
    Add {
        #[arg(long)]
        student: String,
        #[arg(long)]
        probability: f64,
        #[arg(long)]
        risk_level: RiskLevel,
        #[arg(long)]
        model_version: Option<String>,
        /// Factor snapshot as a JSON object
        #[arg(long, default_value = "{}")]
        factors: String,
    },
    History { student: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropout_early_warning=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let pool = db::connect(&cli.database_url, cli.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    let actor = cli.actor.map(|profile_id| Actor { profile_id });

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportStudents { csv } => {
            let written = db::import_students_csv(&pool, &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Imported {written} students from {}.", csv.display());
        }
        Commands::Dashboard { window, format } => {
            let config = window.into_config()?;
            let dashboard = refresh_dashboard(&pool, &config).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dashboard)?),
                OutputFormat::Text => print_dashboard(&dashboard),
            }
        }
        Commands::Report { window, out } => {
            let config = window.into_config()?;
            let dashboard = refresh_dashboard(&pool, &config).await?;
            let report = report::build_report(Utc::now().date_naive(), &config, &dashboard);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Students(command) => run_students(&pool, actor.as_ref(), command).await?,
        Commands::Subjects(command) => run_subjects(&pool, actor.as_ref(), command).await?,
        Commands::Profiles(command) => run_profiles(&pool, command).await?,
        Commands::Enrollments(command) => run_enrollments(&pool, command).await?,
        Commands::Assignments(command) => run_assignments(&pool, command).await?,
        Commands::Grades(command) => run_grades(&pool, actor, command).await?,
        Commands::Attendance(command) => run_attendance(&pool, actor, command).await?,
        Commands::Predictions(command) => run_predictions(&pool, command).await?,
    }

    Ok(())
}

/// Fetches the raw rows for one refresh and hands them to the aggregator.
async fn refresh_dashboard(pool: &PgPool, config: &DashboardConfig) -> anyhow::Result<Dashboard> {
    let cutoff = config.attendance_cutoff(Utc::now().date_naive());
    let (active_students, predictions, attendance) = match fetch_dashboard_rows(pool, cutoff).await
    {
        Ok(rows) => rows,
        Err(err) if err.is_fetch_failure() => {
            warn!(%cutoff, "dashboard refresh failed: {err}");
            return Err(err).context("could not load dashboard data");
        }
        Err(err) => {
            error!("stored dashboard rows are unreadable: {err}");
            return Err(err).context("could not decode dashboard data");
        }
    };

    match risk::build_dashboard(config, active_students, &predictions, &attendance) {
        Ok(dashboard) => {
            info!(
                at_risk = dashboard.stats.at_risk_students,
                window = dashboard.recent_risk_students.len(),
                "dashboard refreshed"
            );
            Ok(dashboard)
        }
        Err(err) if err.is_contract_violation() => {
            error!("prediction data failed validation: {err}");
            Err(err).context("stored predictions violate the dashboard contract")
        }
        Err(err) => Err(err.into()),
    }
}

async fn fetch_dashboard_rows(
    pool: &PgPool,
    cutoff: NaiveDate,
) -> error::Result<(i64, Vec<PredictionRecord>, Vec<Attendance>)> {
    let active_students = db::count_active_students(pool).await?;
    let predictions = db::fetch_active_predictions(pool).await?;
    let attendance = db::fetch_attendance_since(pool, cutoff).await?;
    Ok((active_students, predictions, attendance))
}

fn print_dashboard(dashboard: &Dashboard) {
    let stats = &dashboard.stats;
    println!("Active students:       {}", stats.total_students);
    println!("At-risk students:      {}", stats.at_risk_students);
    println!("Dropout prediction:    {:.2}", stats.dropout_prediction);
    println!("Average attendance:    {:.1}%", stats.average_attendance);
    println!(
        "Distribution:          bajo {} / medio {} / alto {}",
        dashboard.distribution.bajo, dashboard.distribution.medio, dashboard.distribution.alto
    );

    if dashboard.recent_risk_students.is_empty() {
        println!("No active predictions recorded.");
        return;
    }
    println!("Recent risk students:");
    for entry in &dashboard.recent_risk_students {
        println!(
            "- {} ({}) {} {}%",
            entry.name, entry.student_code, entry.risk, entry.probability
        );
    }
}

fn require_actor(actor: Option<Actor>) -> anyhow::Result<Actor> {
    match actor {
        Some(actor) => Ok(actor),
        None => bail!("--actor (or DROPOUT_ACTOR_ID) is required to record this entry"),
    }
}

/// Accepts a student code or the student's id.
async fn student_by_code(pool: &PgPool, code: &str) -> anyhow::Result<Student> {
    let found = match Uuid::parse_str(code) {
        Ok(id) => repository::get_student(pool, id).await?,
        Err(_) => repository::find_student_by_code(pool, code).await?,
    };
    found.with_context(|| format!("no student with code {code}"))
}

async fn subject_by_code(pool: &PgPool, code: &str) -> anyhow::Result<Subject> {
    repository::find_subject_by_code(pool, code)
        .await?
        .with_context(|| format!("no subject with code {code}"))
}

async fn optional_student_id(pool: &PgPool, code: Option<&str>) -> anyhow::Result<Option<Uuid>> {
    Ok(match code {
        Some(code) => Some(student_by_code(pool, code).await?.id),
        None => None,
    })
}

async fn optional_subject_id(pool: &PgPool, code: Option<&str>) -> anyhow::Result<Option<Uuid>> {
    Ok(match code {
        Some(code) => Some(subject_by_code(pool, code).await?.id),
        None => None,
    })
}

async fn run_students(
    pool: &PgPool,
    actor: Option<&Actor>,
    command: StudentCommand,
) -> anyhow::Result<()> {
    match command {
        StudentCommand::List { status } => {
            let students = repository::list_students(pool, status).await?;
            if students.is_empty() {
                println!("No students found.");
            }
            for student in students {
                println!(
                    "{} {} [{}] {} sem {}",
                    student.student_code,
                    student.full_name(),
                    student.status.label(),
                    student.program,
                    student.semester
                );
            }
        }
        StudentCommand::Show { code } => {
            let student = student_by_code(pool, &code).await?;
            let prediction = repository::current_prediction(pool, student.id).await?;
            print!("{}", report::build_student_profile(&student, prediction.as_ref()));
        }
        StudentCommand::Add {
            code,
            first_name,
            last_name,
            program,
            semester,
            enrollment_date,
            status,
            contact,
            factors,
        } => {
            let student = repository::create_student(
                pool,
                actor,
                &NewStudent {
                    student_code: code,
                    first_name,
                    last_name,
                    email: contact.email,
                    phone: contact.phone,
                    birth_date: contact.birth_date,
                    gender: contact.gender,
                    address: contact.address,
                    program,
                    semester,
                    enrollment_date,
                    status,
                    factors: factors.into(),
                },
            )
            .await?;
            println!("Created student {} ({}).", student.student_code, student.id);
        }
        StudentCommand::Edit {
            code,
            first_name,
            last_name,
            program,
            semester,
            enrollment_date,
            status,
            contact,
            factors,
        } => {
            let student = student_by_code(pool, &code).await?;
            let update = StudentUpdate {
                first_name,
                last_name,
                email: contact.email,
                phone: contact.phone,
                birth_date: contact.birth_date,
                gender: contact.gender,
                address: contact.address,
                program,
                semester,
                enrollment_date,
                status,
                factors: factors.into(),
            };
            let updated = repository::update_student(pool, student.id, &update).await?;
            println!("Updated student {}.", updated.student_code);
        }
        StudentCommand::SetStatus { code, status } => {
            let student = student_by_code(pool, &code).await?;
            let updated = repository::update_student_status(pool, student.id, status).await?;
            println!("{} is now {}.", updated.student_code, updated.status.label());
        }
        StudentCommand::Delete { code } => {
            let student = student_by_code(pool, &code).await?;
            repository::delete_student(pool, student.id).await?;
            println!("Deleted student {code}.");
        }
    }
    Ok(())
}

async fn run_subjects(
    pool: &PgPool,
    actor: Option<&Actor>,
    command: SubjectCommand,
) -> anyhow::Result<()> {
    match command {
        SubjectCommand::List { program } => {
            for subject in repository::list_subjects(pool, program.as_deref()).await? {
                println!(
                    "{} {} ({}, semester {}, {} credits)",
                    subject.code, subject.name, subject.program, subject.semester, subject.credits
                );
            }
        }
        SubjectCommand::Add {
            code,
            name,
            program,
            semester,
            credits,
        } => {
            let subject = repository::create_subject(
                pool,
                actor,
                &NewSubject {
                    code,
                    name,
                    program,
                    semester,
                    credits,
                },
            )
            .await?;
            println!("Created subject {} ({}).", subject.code, subject.id);
        }
        SubjectCommand::Delete { code } => {
            let subject = subject_by_code(pool, &code).await?;
            repository::delete_subject(pool, subject.id).await?;
            println!("Deleted subject {code}.");
        }
    }
    Ok(())
}

async fn run_profiles(pool: &PgPool, command: ProfileCommand) -> anyhow::Result<()> {
    match command {
        ProfileCommand::List { role } => {
            for profile in repository::list_profiles(pool, role).await? {
                println!(
                    "{} {} {} <{}>",
                    profile.id, profile.first_name, profile.last_name, profile.email
                );
            }
        }
        ProfileCommand::Add {
            email,
            first_name,
            last_name,
            role,
        } => {
            let profile =
                repository::create_profile(pool, &email, &first_name, &last_name, role).await?;
            println!("Created profile {} as {}.", profile.id, role);
        }
    }
    Ok(())
}

async fn run_enrollments(pool: &PgPool, command: EnrollmentCommand) -> anyhow::Result<()> {
    match command {
        EnrollmentCommand::List {
            student,
            subject,
            period,
        } => {
            let student_id = optional_student_id(pool, student.as_deref()).await?;
            let subject_id = optional_subject_id(pool, subject.as_deref()).await?;
            let enrollments =
                repository::list_enrollments(pool, student_id, subject_id, period.as_deref())
                    .await?;
            for enrollment in enrollments {
                println!(
                    "{} student {} subject {} {} [{}]",
                    enrollment.id,
                    enrollment.student_id,
                    enrollment.subject_id,
                    enrollment.academic_period,
                    enrollment.status
                );
            }
        }
        EnrollmentCommand::Add {
            student,
            subject,
            period,
            status,
        } => {
            let student = student_by_code(pool, &student).await?;
            let subject = subject_by_code(pool, &subject).await?;
            let enrollment = repository::create_enrollment(
                pool,
                &NewEnrollment {
                    student_id: student.id,
                    subject_id: subject.id,
                    academic_period: period,
                    status,
                },
            )
            .await?;
            println!(
                "Enrolled {} in {} for {} ({}).",
                student.student_code, subject.code, enrollment.academic_period, enrollment.id
            );
        }
        EnrollmentCommand::Delete { id } => {
            if !repository::delete_enrollment(pool, id).await? {
                bail!("no enrollment {id}");
            }
            println!("Deleted enrollment {id}.");
        }
    }
    Ok(())
}

async fn run_assignments(pool: &PgPool, command: AssignmentCommand) -> anyhow::Result<()> {
    match command {
        AssignmentCommand::List { teacher, period } => {
            for assignment in
                repository::list_assignments(pool, teacher, period.as_deref()).await?
            {
                println!(
                    "{} teacher {} subject {} {} [{}]",
                    assignment.id,
                    assignment.teacher_id,
                    assignment.subject_id,
                    assignment.academic_period,
                    assignment.status
                );
            }
        }
        AssignmentCommand::Add {
            teacher,
            subject,
            period,
            status,
        } => {
            let subject = subject_by_code(pool, &subject).await?;
            let assignment = repository::create_assignment(
                pool,
                &NewAssignment {
                    teacher_id: teacher,
                    subject_id: subject.id,
                    academic_period: period,
                    status,
                },
            )
            .await?;
            println!("Assigned {} to {} ({}).", teacher, subject.code, assignment.id);
        }
        AssignmentCommand::Delete { id } => {
            if !repository::delete_assignment(pool, id).await? {
                bail!("no assignment {id}");
            }
            println!("Deleted assignment {id}.");
        }
    }
    Ok(())
}

async fn run_grades(pool: &PgPool, actor: Option<Actor>, command: GradeCommand) -> anyhow::Result<()> {
    match command {
        GradeCommand::List { student, subject } => {
            let student_id = optional_student_id(pool, student.as_deref()).await?;
            let subject_id = optional_subject_id(pool, subject.as_deref()).await?;
            for grade in repository::list_grades(pool, student_id, subject_id).await? {
                println!(
                    "{} {} {:.1} {} ({}){}",
                    grade.grade_date,
                    grade.grade_type,
                    grade.grade,
                    grade.academic_period,
                    grade.id,
                    grade
                        .observations
                        .as_deref()
                        .map(|notes| format!(": {notes}"))
                        .unwrap_or_default()
                );
            }
        }
        GradeCommand::Add {
            student,
            subject,
            period,
            grade,
            grade_type,
            date,
            notes,
        } => {
            let actor = require_actor(actor)?;
            let student = student_by_code(pool, &student).await?;
            let subject = subject_by_code(pool, &subject).await?;
            let created = repository::create_grade(
                pool,
                &actor,
                &NewGrade {
                    student_id: student.id,
                    subject_id: subject.id,
                    academic_period: period,
                    grade,
                    grade_type,
                    grade_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                    observations: notes,
                },
            )
            .await?;
            println!(
                "Recorded {} {:.1} for {} in {}.",
                created.grade_type, created.grade, student.student_code, subject.code
            );
        }
        GradeCommand::Delete { id } => {
            if !repository::delete_grade(pool, id).await? {
                bail!("no grade {id}");
            }
            println!("Deleted grade {id}.");
        }
    }
    Ok(())
}

async fn run_attendance(
    pool: &PgPool,
    actor: Option<Actor>,
    command: AttendanceCommand,
) -> anyhow::Result<()> {
    match command {
        AttendanceCommand::List { subject, date } => {
            let subject_id = optional_subject_id(pool, subject.as_deref()).await?;
            for record in repository::list_attendance(pool, subject_id, date).await? {
                let mark = match (record.is_present, record.is_late) {
                    (true, true) => "late",
                    (true, false) => "present",
                    (false, _) => "absent",
                };
                println!("{} {} {}", record.attendance_date, record.student_id, mark);
            }
        }
        AttendanceCommand::Record {
            subject,
            period,
            date,
            present,
            late,
        } => {
            let actor = require_actor(actor)?;
            let subject = subject_by_code(pool, &subject).await?;
            let roster = repository::roster_for_subject(pool, subject.id, &period).await?;
            if roster.is_empty() {
                bail!("no active enrollments in {} for {period}", subject.code);
            }

            for code in present.iter().chain(late.iter()) {
                if !roster.iter().any(|student| &student.student_code == code) {
                    bail!("{code} is not enrolled in {} for {period}", subject.code);
                }
            }

            let marks = roster
                .iter()
                .map(|student| {
                    let is_late = late.contains(&student.student_code);
                    AttendanceMark {
                        student_id: student.id,
                        is_present: is_late || present.contains(&student.student_code),
                        is_late,
                        observations: None,
                    }
                })
                .collect();
            let roster = AttendanceRoster {
                subject_id: subject.id,
                academic_period: period,
                attendance_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                marks,
            };
            let written = repository::record_attendance(pool, &actor, &roster).await?;
            println!(
                "Recorded attendance for {written} students in {} on {} ({} present).",
                subject.code,
                roster.attendance_date,
                roster.present_count()
            );
        }
    }
    Ok(())
}

async fn run_predictions(pool: &PgPool, command: PredictionCommand) -> anyhow::Result<()> {
    match command {
        PredictionCommand::Add {
            student,
            probability,
            risk_level,
            model_version,
            factors,
        } => {
            let student = student_by_code(pool, &student).await?;
            let factors_analyzed: serde_json::Value =
                serde_json::from_str(&factors).context("--factors must be valid JSON")?;
            let prediction = repository::create_prediction(
                pool,
                &NewPrediction {
                    student_id: student.id,
                    risk_level,
                    probability,
                    factors_analyzed,
                    model_version,
                },
            )
            .await?;
            println!(
                "Stored {} prediction for {} ({}).",
                prediction.risk_level, student.student_code, prediction.id
            );
        }
        PredictionCommand::History { student } => {
            let student = student_by_code(pool, &student).await?;
            for prediction in repository::list_predictions(pool, student.id).await? {
                println!(
                    "{} {} {:.2}{}",
                    prediction.prediction_date.format("%Y-%m-%d %H:%M"),
                    prediction.risk_level.label(),
                    prediction.probability,
                    if prediction.is_active { "" } else { " (inactive)" }
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["dropout-early-warning", "--database-url", "postgres://localhost/test"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_accepts_contact_and_factor_flags() {
        let cli = parse(&[
            "students",
            "add",
            "--code",
            "2024006",
            "--first-name",
            "Ana",
            "--last-name",
            "Ruiz",
            "--program",
            "Contaduría",
            "--semester",
            "2",
            "--enrollment-date",
            "2024-01-15",
            "--phone",
            "3001234567",
            "--birth-date",
            "2001-02-03",
            "--family-income",
            "1800000",
            "--has-scholarship",
            "true",
        ]);
        let Commands::Students(StudentCommand::Add { contact, factors, status, .. }) = cli.command
        else {
            panic!("expected students add");
        };
        assert_eq!(status, None);
        assert_eq!(contact.phone.as_deref(), Some("3001234567"));
        assert_eq!(contact.birth_date, NaiveDate::from_ymd_opt(2001, 2, 3));
        let factors = SocioeconomicFactors::from(factors);
        assert_eq!(factors.family_income, Some(1_800_000.0));
        assert_eq!(factors.has_scholarship, Some(true));
        assert_eq!(factors.family_size, None);
    }

    #[test]
    fn edit_leaves_unset_fields_empty() {
        let cli = parse(&["students", "edit", "2024001", "--status", "desertor", "--work-hours-per-week", "30"]);
        let Commands::Students(StudentCommand::Edit {
            code,
            first_name,
            status,
            contact,
            factors,
            ..
        }) = cli.command
        else {
            panic!("expected students edit");
        };
        assert_eq!(code, "2024001");
        assert_eq!(first_name, None);
        assert_eq!(status, Some(StudentStatus::Desertor));
        assert!(contact.email.is_none());
        assert_eq!(SocioeconomicFactors::from(factors).work_hours_per_week, Some(30));
    }
}
