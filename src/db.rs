use std::path::Path;

use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Attendance, NewStudent, PredictionRecord, SocioeconomicFactors, StudentStatus};
use crate::repository::attendance_from_row;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    info!(max_connections, "connected to Postgres");
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("schema migrations applied");
    Ok(())
}

pub async fn count_active_students(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query("SELECT COUNT(*) AS total FROM dropout_watch.students WHERE status = $1")
        .bind(StudentStatus::Activo.as_str())
        .fetch_one(pool)
        .await?
        .try_get("total")?;
    Ok(count)
}

fn prediction_record_from_row(row: &PgRow) -> Result<PredictionRecord> {
    Ok(PredictionRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        student_code: row.try_get("student_code")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        risk_level: row.try_get::<String, _>("risk_level")?.parse()?,
        probability: row.try_get("probability")?,
        is_active: row.try_get("is_active")?,
        prediction_date: row.try_get("prediction_date")?,
    })
}

/// Active predictions joined with student identity, latest first.
pub async fn fetch_active_predictions(pool: &PgPool) -> Result<Vec<PredictionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.student_id, s.student_code, s.first_name, s.last_name,
               p.risk_level, p.probability, p.is_active, p.prediction_date
        FROM dropout_watch.dropout_predictions p
        JOIN dropout_watch.students s ON s.id = p.student_id
        WHERE p.is_active
        ORDER BY p.prediction_date DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let predictions = rows
        .iter()
        .map(prediction_record_from_row)
        .collect::<Result<Vec<_>>>()?;
    info!(count = predictions.len(), "fetched active predictions");
    Ok(predictions)
}

pub async fn fetch_attendance_since(pool: &PgPool, since_date: NaiveDate) -> Result<Vec<Attendance>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_id, subject_id, academic_period, attendance_date, is_present,
               is_late, observations, created_by
        FROM dropout_watch.attendances
        WHERE attendance_date >= $1
        "#,
    )
    .bind(since_date)
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(attendance_from_row)
        .collect::<Result<Vec<_>>>()?;
    if records.is_empty() {
        warn!(%since_date, "no attendance recorded in window");
    }
    Ok(records)
}

pub async fn seed(pool: &PgPool) -> Result<()> {
    let coordinator = Uuid::parse_str("8a1f0c52-6c3e-4d0b-9a6e-2f1b7c9d4e01").map_err(invalid_seed)?;
    let teacher = Uuid::parse_str("5b7e2d91-3f4a-4c8e-b1d2-7e6f5a4c3b02").map_err(invalid_seed)?;

    for (id, email, first, last, role) in [
        (coordinator, "coordinacion@universidad.edu.co", "Laura", "Gómez", "coordinador_academico"),
        (teacher, "docente.sistemas@universidad.edu.co", "Andrés", "Rojas", "docente"),
    ] {
        sqlx::query(
            r#"
            INSERT INTO dropout_watch.profiles (id, email, first_name, last_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(first)
        .bind(last)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO dropout_watch.user_roles (id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(role)
        .execute(pool)
        .await?;
    }

    let enrolled_on = NaiveDate::from_ymd_opt(2024, 1, 15).ok_or_else(|| invalid_seed("date"))?;
    let students = vec![
        ("2024001", "Juan", "Pérez", "Ingeniería de Sistemas", 3, 2_000_000.0, 20, false, true),
        ("2024002", "María", "García", "Administración", 2, 1_500_000.0, 0, true, true),
        ("2024003", "Camila", "Restrepo", "Ingeniería de Sistemas", 5, 3_200_000.0, 10, false, false),
        ("2024004", "Santiago", "Mejía", "Contaduría", 1, 1_100_000.0, 36, false, true),
        ("2024005", "Valentina", "Ospina", "Administración", 4, 2_600_000.0, 0, true, false),
    ];

    let mut student_ids = Vec::new();
    for (code, first, last, program, semester, income, work_hours, scholarship, first_gen) in students {
        let factors = SocioeconomicFactors {
            family_income: Some(income),
            work_hours_per_week: Some(work_hours),
            has_scholarship: Some(scholarship),
            is_first_generation: Some(first_gen),
            ..SocioeconomicFactors::default()
        };
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO dropout_watch.students
            (id, student_code, first_name, last_name, program, semester, enrollment_date, status,
             family_income, work_hours_per_week, has_scholarship, is_first_generation, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'activo', $8, $9, $10, $11, $12)
            ON CONFLICT (student_code) DO UPDATE
            SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(first)
        .bind(last)
        .bind(program)
        .bind(semester)
        .bind(enrolled_on)
        .bind(factors.family_income)
        .bind(factors.work_hours_per_week)
        .bind(factors.has_scholarship)
        .bind(factors.is_first_generation)
        .bind(coordinator)
        .fetch_one(pool)
        .await?
        .try_get("id")?;
        student_ids.push(id);
    }

    let subject_id: Uuid = sqlx::query(
        r#"
        INSERT INTO dropout_watch.subjects (id, code, name, program, semester, credits, created_by)
        VALUES ($1, 'IS-301', 'Estructuras de Datos', 'Ingeniería de Sistemas', 3, 4, $2)
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(coordinator)
    .fetch_one(pool)
    .await?
    .try_get("id")?;

    sqlx::query(
        r#"
        INSERT INTO dropout_watch.subject_assignments (id, teacher_id, subject_id, academic_period)
        VALUES ($1, $2, $3, '2024-1')
        ON CONFLICT (teacher_id, subject_id, academic_period) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(teacher)
    .bind(subject_id)
    .execute(pool)
    .await?;

    let today = Utc::now().date_naive();
    let probabilities = [0.85, 0.65, 0.25, 0.78, 0.12];
    let levels = ["critico", "medio", "bajo", "alto", "bajo"];

    for (index, student_id) in student_ids.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO dropout_watch.enrollments (id, student_id, subject_id, academic_period)
            VALUES ($1, $2, $3, '2024-1')
            ON CONFLICT (student_id, subject_id, academic_period) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(subject_id)
        .execute(pool)
        .await?;

        for days_ago in [2i64, 9, 16] {
            sqlx::query(
                r#"
                INSERT INTO dropout_watch.attendances
                (id, student_id, subject_id, academic_period, attendance_date, is_present, created_by)
                VALUES ($1, $2, $3, '2024-1', $4, $5, $6)
                ON CONFLICT (student_id, subject_id, attendance_date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(subject_id)
            .bind(today - Duration::days(days_ago))
            .bind(!(index == 0 && days_ago < 10))
            .bind(teacher)
            .execute(pool)
            .await?;
        }

        let has_prediction: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM dropout_watch.dropout_predictions WHERE student_id = $1) AS present",
        )
        .bind(student_id)
        .fetch_one(pool)
        .await?
        .try_get("present")?;
        if has_prediction {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO dropout_watch.dropout_predictions
            (id, student_id, risk_level, probability, factors_analyzed, model_version, prediction_date)
            VALUES ($1, $2, $3, $4, $5, 'seed-v1', $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(levels[index])
        .bind(probabilities[index])
        .bind(serde_json::json!({ "attendance_rate": 0.8, "average_grade": 3.4 }))
        .bind(Utc::now() - Duration::hours(index as i64))
        .execute(pool)
        .await?;
    }

    info!(students = student_ids.len(), "seed data ready");
    Ok(())
}

fn invalid_seed(err: impl std::fmt::Display) -> Error {
    Error::InvalidInput(format!("invalid seed constant: {err}"))
}

/// Column layout of the student import template.
#[derive(Debug, serde::Deserialize)]
struct StudentCsvRow {
    student_code: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    birth_date: Option<NaiveDate>,
    gender: Option<String>,
    address: Option<String>,
    program: String,
    semester: i32,
    enrollment_date: NaiveDate,
    status: Option<String>,
    family_income: Option<f64>,
    parents_education_level: Option<String>,
    work_hours_per_week: Option<i32>,
    has_scholarship: Option<bool>,
    transportation_type: Option<String>,
    distance_to_university: Option<f64>,
    family_size: Option<i32>,
    is_first_generation: Option<bool>,
}

impl StudentCsvRow {
    fn into_new_student(self) -> Result<NewStudent> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<StudentStatus>()?),
        };
        Ok(NewStudent {
            student_code: self.student_code,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            birth_date: self.birth_date,
            gender: self.gender,
            address: self.address,
            program: self.program,
            semester: self.semester,
            enrollment_date: self.enrollment_date,
            status,
            factors: SocioeconomicFactors {
                family_income: self.family_income,
                parents_education_level: self.parents_education_level,
                work_hours_per_week: self.work_hours_per_week,
                has_scholarship: self.has_scholarship,
                transportation_type: self.transportation_type,
                distance_to_university: self.distance_to_university,
                family_size: self.family_size,
                is_first_generation: self.is_first_generation,
            },
        })
    }
}

fn read_student_csv<R: std::io::Read>(reader: R) -> Result<Vec<NewStudent>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut students = Vec::new();
    for (line, result) in reader.deserialize::<StudentCsvRow>().enumerate() {
        let student = result?.into_new_student()?;
        student.validate().map_err(|err| {
            Error::InvalidInput(format!("row {}: {err}", line + 2))
        })?;
        students.push(student);
    }
    Ok(students)
}

/// Upserts on `student_code`; returns how many rows were written.
///
/// A blank `status` column inserts new students as `activo` and leaves the
/// stored status of existing students untouched.
pub async fn import_students_csv(pool: &PgPool, csv_path: &Path) -> Result<usize> {
    let file = std::fs::File::open(csv_path)
        .map_err(|err| Error::InvalidInput(format!("{}: {err}", csv_path.display())))?;
    let students = read_student_csv(file)?;
    if students.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} contains no student rows",
            csv_path.display()
        )));
    }

    let written = upsert_students(pool, &students).await?;
    info!(written, path = %csv_path.display(), "students imported");
    Ok(written)
}

async fn upsert_students(pool: &PgPool, students: &[NewStudent]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;
    for student in students {
        let factors = &student.factors;
        let result = sqlx::query(
            r#"
            INSERT INTO dropout_watch.students
            (id, student_code, first_name, last_name, email, phone, birth_date, gender, address,
             program, semester, enrollment_date, status, family_income, parents_education_level,
             work_hours_per_week, has_scholarship, transportation_type, distance_to_university,
             family_size, is_first_generation)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, COALESCE($13, 'activo'),
                    $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (student_code) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                birth_date = EXCLUDED.birth_date,
                gender = EXCLUDED.gender,
                address = EXCLUDED.address,
                program = EXCLUDED.program,
                semester = EXCLUDED.semester,
                enrollment_date = EXCLUDED.enrollment_date,
                status = COALESCE($13, students.status),
                family_income = EXCLUDED.family_income,
                parents_education_level = EXCLUDED.parents_education_level,
                work_hours_per_week = EXCLUDED.work_hours_per_week,
                has_scholarship = EXCLUDED.has_scholarship,
                transportation_type = EXCLUDED.transportation_type,
                distance_to_university = EXCLUDED.distance_to_university,
                family_size = EXCLUDED.family_size,
                is_first_generation = EXCLUDED.is_first_generation,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student.student_code.trim())
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(student.birth_date)
        .bind(&student.gender)
        .bind(&student.address)
        .bind(&student.program)
        .bind(student.semester)
        .bind(student.enrollment_date)
        .bind(student.status.map(|status| status.as_str()))
        .bind(factors.family_income)
        .bind(&factors.parents_education_level)
        .bind(factors.work_hours_per_week)
        .bind(factors.has_scholarship)
        .bind(&factors.transportation_type)
        .bind(factors.distance_to_university)
        .bind(factors.family_size)
        .bind(factors.is_first_generation)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }
    tx.commit().await?;
    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "student_code,first_name,last_name,email,phone,birth_date,gender,address,program,semester,enrollment_date,status,family_income,parents_education_level,work_hours_per_week,has_scholarship,transportation_type,distance_to_university,family_size,is_first_generation
2024001,Juan,Pérez,juan.perez@email.com,3001234567,1999-05-15,masculino,\"Calle 123 #45-67\",Ingeniería de Sistemas,3,2024-01-15,activo,2000000,universitario,20,false,publico,15.5,4,false
2024002,María,García,maria.garcia@email.com,3007654321,2000-08-22,femenino,\"Carrera 89 #12-34\",Administración,2,2024-01-15,,1500000,secundaria,0,true,publico,8.2,3,true
";

    #[test]
    fn parses_import_template() {
        let students = read_student_csv(TEMPLATE.as_bytes()).unwrap();
        assert_eq!(students.len(), 2);

        let juan = &students[0];
        assert_eq!(juan.student_code, "2024001");
        assert_eq!(juan.address.as_deref(), Some("Calle 123 #45-67"));
        assert_eq!(juan.status, Some(StudentStatus::Activo));
        assert_eq!(juan.factors.distance_to_university, Some(15.5));
        assert_eq!(juan.factors.has_scholarship, Some(false));

        let maria = &students[1];
        assert_eq!(maria.status, None);
        assert_eq!(maria.factors.is_first_generation, Some(true));
        assert_eq!(maria.factors.work_hours_per_week, Some(0));
    }

    #[test]
    fn rejects_unknown_status() {
        let csv = "student_code,first_name,last_name,program,semester,enrollment_date,status\n\
                   2024009,Ana,Ruiz,Contaduría,1,2024-01-15,suspendido\n";
        let err = read_student_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn reports_row_number_for_invalid_semester() {
        let csv = "student_code,first_name,last_name,program,semester,enrollment_date\n\
                   2024010,Luis,Mora,Contaduría,0,2024-01-15\n";
        let err = read_student_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    fn import_row(code: &str, address: &str, status: &str) -> String {
        format!(
            "student_code,first_name,last_name,address,program,semester,enrollment_date,status\n\
             {code},Santiago,Mejía,{address},Contaduría,1,2024-01-15,{status}\n"
        )
    }

    #[tokio::test]
    async fn reimport_without_status_keeps_stored_status() {
        let Some(pool) = test_support::test_pool().await else {
            return;
        };
        let code = test_support::unique_code("imp");

        let first = read_student_csv(import_row(&code, "Calle 10", "desertor").as_bytes()).unwrap();
        assert_eq!(upsert_students(&pool, &first).await.unwrap(), 1);

        let again = read_student_csv(import_row(&code, "Carrera 7", "").as_bytes()).unwrap();
        assert_eq!(upsert_students(&pool, &again).await.unwrap(), 1);

        let student = crate::repository::find_student_by_code(&pool, &code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.status, StudentStatus::Desertor);
        assert_eq!(student.address.as_deref(), Some("Carrera 7"));
    }

    #[tokio::test]
    async fn import_without_status_inserts_active_students() {
        let Some(pool) = test_support::test_pool().await else {
            return;
        };
        let code = test_support::unique_code("imp");

        let rows = read_student_csv(import_row(&code, "Calle 10", "").as_bytes()).unwrap();
        upsert_students(&pool, &rows).await.unwrap();

        let student = crate::repository::find_student_by_code(&pool, &code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.status, StudentStatus::Activo);
    }

    #[tokio::test]
    async fn active_predictions_come_latest_first() {
        let Some(pool) = test_support::test_pool().await else {
            return;
        };
        let student = crate::repository::create_student(
            &pool,
            None,
            &test_support::new_student(&test_support::unique_code("pred")),
        )
        .await
        .unwrap();
        let now = Utc::now();
        let older = test_support::insert_prediction(&pool, student.id, 0.30, true, now - Duration::days(3)).await;
        let newer = test_support::insert_prediction(&pool, student.id, 0.75, true, now - Duration::days(1)).await;
        let retired = test_support::insert_prediction(&pool, student.id, 0.10, false, now).await;

        let ids: Vec<Uuid> = fetch_active_predictions(&pool)
            .await
            .unwrap()
            .into_iter()
            .filter(|record| record.student_id == student.id)
            .map(|record| {
                assert_eq!(record.student_code, student.student_code);
                record.id
            })
            .collect();
        assert_eq!(ids, vec![newer, older]);
        assert!(!ids.contains(&retired));
    }
}
