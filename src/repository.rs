use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Actor, AppRole, Assignment, Attendance, AttendanceRoster, Enrollment, Grade, NewAssignment,
    NewEnrollment, NewGrade, NewPrediction, NewStudent, NewSubject, Prediction, Profile,
    SocioeconomicFactors, Student, StudentStatus, StudentUpdate, Subject,
};

const STUDENT_COLUMNS: &str = "id, student_code, first_name, last_name, email, phone, \
     birth_date, gender, address, program, semester, enrollment_date, status, family_income, \
     parents_education_level, work_hours_per_week, has_scholarship, transportation_type, \
     distance_to_university, family_size, is_first_generation, created_by";

const PREDICTION_COLUMNS: &str = "id, student_id, risk_level, probability, factors_analyzed, \
     model_version, is_active, prediction_date";

pub(crate) fn student_from_row(row: &PgRow) -> Result<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        student_code: row.try_get("student_code")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        birth_date: row.try_get("birth_date")?,
        gender: row.try_get("gender")?,
        address: row.try_get("address")?,
        program: row.try_get("program")?,
        semester: row.try_get("semester")?,
        enrollment_date: row.try_get("enrollment_date")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        factors: SocioeconomicFactors {
            family_income: row.try_get("family_income")?,
            parents_education_level: row.try_get("parents_education_level")?,
            work_hours_per_week: row.try_get("work_hours_per_week")?,
            has_scholarship: row.try_get("has_scholarship")?,
            transportation_type: row.try_get("transportation_type")?,
            distance_to_university: row.try_get("distance_to_university")?,
            family_size: row.try_get("family_size")?,
            is_first_generation: row.try_get("is_first_generation")?,
        },
        created_by: row.try_get("created_by")?,
    })
}

fn subject_from_row(row: &PgRow) -> Result<Subject> {
    Ok(Subject {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        program: row.try_get("program")?,
        semester: row.try_get("semester")?,
        credits: row.try_get("credits")?,
    })
}

fn enrollment_from_row(row: &PgRow) -> Result<Enrollment> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_period: row.try_get("academic_period")?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment> {
    Ok(Assignment {
        id: row.try_get("id")?,
        teacher_id: row.try_get("teacher_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_period: row.try_get("academic_period")?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn grade_from_row(row: &PgRow) -> Result<Grade> {
    Ok(Grade {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_period: row.try_get("academic_period")?,
        grade: row.try_get("grade")?,
        grade_type: row.try_get::<String, _>("grade_type")?.parse()?,
        grade_date: row.try_get("grade_date")?,
        observations: row.try_get("observations")?,
        created_by: row.try_get("created_by")?,
    })
}

pub(crate) fn attendance_from_row(row: &PgRow) -> Result<Attendance> {
    Ok(Attendance {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_period: row.try_get("academic_period")?,
        attendance_date: row.try_get("attendance_date")?,
        is_present: row.try_get("is_present")?,
        is_late: row.try_get("is_late")?,
        observations: row.try_get("observations")?,
        created_by: row.try_get("created_by")?,
    })
}

fn prediction_from_row(row: &PgRow) -> Result<Prediction> {
    Ok(Prediction {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        risk_level: row.try_get::<String, _>("risk_level")?.parse()?,
        probability: row.try_get("probability")?,
        factors_analyzed: row.try_get("factors_analyzed")?,
        model_version: row.try_get("model_version")?,
        is_active: row.try_get("is_active")?,
        prediction_date: row.try_get("prediction_date")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
    })
}

async fn delete_by_id(pool: &PgPool, table: &str, id: Uuid) -> Result<bool> {
    let result = sqlx::query(&format!("DELETE FROM dropout_watch.{table} WHERE id = $1"))
        .bind(id)
        .execute(pool)
        .await?;
    let removed = result.rows_affected() > 0;
    debug!(table, %id, removed, "delete by id");
    Ok(removed)
}

pub async fn create_profile(
    pool: &PgPool,
    email: &str,
    first_name: &str,
    last_name: &str,
    role: AppRole,
) -> Result<Profile> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        r#"
        INSERT INTO dropout_watch.profiles (id, email, first_name, last_name)
        VALUES ($1, $2, $3, $4)
        RETURNING id, email, first_name, last_name
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(first_name)
    .bind(last_name)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| Error::from_insert(err, format!("profile {email}")))?;
    let profile = profile_from_row(&row)?;

    sqlx::query("INSERT INTO dropout_watch.user_roles (id, user_id, role) VALUES ($1, $2, $3)")
        .bind(Uuid::new_v4())
        .bind(profile.id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(profile_id = %profile.id, role = %role, "profile created");
    Ok(profile)
}

pub async fn list_profiles(pool: &PgPool, role: Option<AppRole>) -> Result<Vec<Profile>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT DISTINCT p.id, p.email, p.first_name, p.last_name \
         FROM dropout_watch.profiles p \
         LEFT JOIN dropout_watch.user_roles r ON r.user_id = p.id WHERE TRUE",
    );
    if let Some(role) = role {
        query.push(" AND r.role = ").push_bind(role.as_str());
    }
    query.push(" ORDER BY p.last_name, p.first_name");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(profile_from_row).collect()
}

pub async fn list_students(pool: &PgPool, status: Option<StudentStatus>) -> Result<Vec<Student>> {
    let mut query = QueryBuilder::<Postgres>::new(format!(
        "SELECT {STUDENT_COLUMNS} FROM dropout_watch.students WHERE TRUE"
    ));
    if let Some(status) = status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    query.push(" ORDER BY student_code");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(student_from_row).collect()
}

pub async fn get_student(pool: &PgPool, id: Uuid) -> Result<Option<Student>> {
    let row = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM dropout_watch.students WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(student_from_row).transpose()
}

pub async fn find_student_by_code(pool: &PgPool, student_code: &str) -> Result<Option<Student>> {
    let row = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM dropout_watch.students WHERE student_code = $1"
    ))
    .bind(student_code)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(student_from_row).transpose()
}

pub async fn create_student(
    pool: &PgPool,
    actor: Option<&Actor>,
    student: &NewStudent,
) -> Result<Student> {
    student.validate()?;
    let factors = &student.factors;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO dropout_watch.students
        (id, student_code, first_name, last_name, email, phone, birth_date, gender, address,
         program, semester, enrollment_date, status, family_income, parents_education_level,
         work_hours_per_week, has_scholarship, transportation_type, distance_to_university,
         family_size, is_first_generation, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22)
        RETURNING {STUDENT_COLUMNS}
        "#
    ))
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
    .bind(student.status.unwrap_or(StudentStatus::Activo).as_str())
    .bind(factors.family_income)
    .bind(&factors.parents_education_level)
    .bind(factors.work_hours_per_week)
    .bind(factors.has_scholarship)
    .bind(&factors.transportation_type)
    .bind(factors.distance_to_university)
    .bind(factors.family_size)
    .bind(factors.is_first_generation)
    .bind(actor.map(|a| a.profile_id))
    .fetch_one(pool)
    .await
    .map_err(|err| Error::from_insert(err, format!("student code {}", student.student_code)))?;

    let created = student_from_row(&row)?;
    info!(student_id = %created.id, code = %created.student_code, "student created");
    Ok(created)
}

pub async fn update_student_status(
    pool: &PgPool,
    id: Uuid,
    status: StudentStatus,
) -> Result<Student> {
    let row = sqlx::query(&format!(
        "UPDATE dropout_watch.students SET status = $2, updated_at = NOW() \
         WHERE id = $1 RETURNING {STUDENT_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("student {id}")))?;
    student_from_row(&row)
}

pub async fn update_student(pool: &PgPool, id: Uuid, update: &StudentUpdate) -> Result<Student> {
    update.validate()?;
    let factors = &update.factors;

    let row = sqlx::query(&format!(
        r#"
        UPDATE dropout_watch.students
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            birth_date = COALESCE($6, birth_date),
            gender = COALESCE($7, gender),
            address = COALESCE($8, address),
            program = COALESCE($9, program),
            semester = COALESCE($10, semester),
            enrollment_date = COALESCE($11, enrollment_date),
            status = COALESCE($12, status),
            family_income = COALESCE($13, family_income),
            parents_education_level = COALESCE($14, parents_education_level),
            work_hours_per_week = COALESCE($15, work_hours_per_week),
            has_scholarship = COALESCE($16, has_scholarship),
            transportation_type = COALESCE($17, transportation_type),
            distance_to_university = COALESCE($18, distance_to_university),
            family_size = COALESCE($19, family_size),
            is_first_generation = COALESCE($20, is_first_generation),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {STUDENT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&update.first_name)
    .bind(&update.last_name)
    .bind(&update.email)
    .bind(&update.phone)
    .bind(update.birth_date)
    .bind(&update.gender)
    .bind(&update.address)
    .bind(&update.program)
    .bind(update.semester)
    .bind(update.enrollment_date)
    .bind(update.status.map(|status| status.as_str()))
    .bind(factors.family_income)
    .bind(&factors.parents_education_level)
    .bind(factors.work_hours_per_week)
    .bind(factors.has_scholarship)
    .bind(&factors.transportation_type)
    .bind(factors.distance_to_university)
    .bind(factors.family_size)
    .bind(factors.is_first_generation)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("student {id}")))?;

    let updated = student_from_row(&row)?;
    info!(student_id = %updated.id, code = %updated.student_code, "student updated");
    Ok(updated)
}

pub async fn delete_student(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_by_id(pool, "students", id).await
}

pub async fn list_subjects(pool: &PgPool, program: Option<&str>) -> Result<Vec<Subject>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT id, code, name, program, semester, credits FROM dropout_watch.subjects WHERE TRUE",
    );
    if let Some(program) = program {
        query.push(" AND program = ").push_bind(program);
    }
    query.push(" ORDER BY code");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(subject_from_row).collect()
}

pub async fn find_subject_by_code(pool: &PgPool, code: &str) -> Result<Option<Subject>> {
    let row = sqlx::query(
        "SELECT id, code, name, program, semester, credits FROM dropout_watch.subjects WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(subject_from_row).transpose()
}

pub async fn create_subject(
    pool: &PgPool,
    actor: Option<&Actor>,
    subject: &NewSubject,
) -> Result<Subject> {
    subject.validate()?;
    let row = sqlx::query(
        r#"
        INSERT INTO dropout_watch.subjects (id, code, name, program, semester, credits, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, code, name, program, semester, credits
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subject.code.trim())
    .bind(&subject.name)
    .bind(&subject.program)
    .bind(subject.semester)
    .bind(subject.credits)
    .bind(actor.map(|a| a.profile_id))
    .fetch_one(pool)
    .await
    .map_err(|err| Error::from_insert(err, format!("subject code {}", subject.code)))?;
    subject_from_row(&row)
}

pub async fn delete_subject(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_by_id(pool, "subjects", id).await
}

pub async fn list_enrollments(
    pool: &PgPool,
    student_id: Option<Uuid>,
    subject_id: Option<Uuid>,
    academic_period: Option<&str>,
) -> Result<Vec<Enrollment>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT id, student_id, subject_id, academic_period, status \
         FROM dropout_watch.enrollments WHERE TRUE",
    );
    if let Some(student_id) = student_id {
        query.push(" AND student_id = ").push_bind(student_id);
    }
    if let Some(subject_id) = subject_id {
        query.push(" AND subject_id = ").push_bind(subject_id);
    }
    if let Some(period) = academic_period {
        query.push(" AND academic_period = ").push_bind(period);
    }
    query.push(" ORDER BY created_at DESC");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(enrollment_from_row).collect()
}

pub async fn create_enrollment(pool: &PgPool, enrollment: &NewEnrollment) -> Result<Enrollment> {
    let row = sqlx::query(
        r#"
        INSERT INTO dropout_watch.enrollments (id, student_id, subject_id, academic_period, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, student_id, subject_id, academic_period, status
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(enrollment.student_id)
    .bind(enrollment.subject_id)
    .bind(&enrollment.academic_period)
    .bind(enrollment.status.as_str())
    .fetch_one(pool)
    .await
    .map_err(|err| {
        Error::from_insert(
            err,
            format!(
                "enrollment of {} in {} for {}",
                enrollment.student_id, enrollment.subject_id, enrollment.academic_period
            ),
        )
    })?;
    enrollment_from_row(&row)
}

pub async fn delete_enrollment(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_by_id(pool, "enrollments", id).await
}

pub async fn list_assignments(
    pool: &PgPool,
    teacher_id: Option<Uuid>,
    academic_period: Option<&str>,
) -> Result<Vec<Assignment>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT id, teacher_id, subject_id, academic_period, status \
         FROM dropout_watch.subject_assignments WHERE TRUE",
    );
    if let Some(teacher_id) = teacher_id {
        query.push(" AND teacher_id = ").push_bind(teacher_id);
    }
    if let Some(period) = academic_period {
        query.push(" AND academic_period = ").push_bind(period);
    }
    query.push(" ORDER BY created_at DESC");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(assignment_from_row).collect()
}

pub async fn create_assignment(pool: &PgPool, assignment: &NewAssignment) -> Result<Assignment> {
    let row = sqlx::query(
        r#"
        INSERT INTO dropout_watch.subject_assignments
        (id, teacher_id, subject_id, academic_period, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, teacher_id, subject_id, academic_period, status
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(assignment.teacher_id)
    .bind(assignment.subject_id)
    .bind(&assignment.academic_period)
    .bind(assignment.status.as_str())
    .fetch_one(pool)
    .await
    .map_err(|err| {
        Error::from_insert(
            err,
            format!(
                "assignment of {} to {} for {}",
                assignment.teacher_id, assignment.subject_id, assignment.academic_period
            ),
        )
    })?;
    assignment_from_row(&row)
}

pub async fn delete_assignment(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_by_id(pool, "subject_assignments", id).await
}

pub async fn list_grades(
    pool: &PgPool,
    student_id: Option<Uuid>,
    subject_id: Option<Uuid>,
) -> Result<Vec<Grade>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT id, student_id, subject_id, academic_period, grade, grade_type, grade_date, \
         observations, created_by FROM dropout_watch.grades WHERE TRUE",
    );
    if let Some(student_id) = student_id {
        query.push(" AND student_id = ").push_bind(student_id);
    }
    if let Some(subject_id) = subject_id {
        query.push(" AND subject_id = ").push_bind(subject_id);
    }
    query.push(" ORDER BY grade_date DESC, created_at DESC");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(grade_from_row).collect()
}

pub async fn create_grade(pool: &PgPool, actor: &Actor, grade: &NewGrade) -> Result<Grade> {
    grade.validate()?;
    let row = sqlx::query(
        r#"
        INSERT INTO dropout_watch.grades
        (id, student_id, subject_id, academic_period, grade, grade_type, grade_date,
         observations, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, student_id, subject_id, academic_period, grade, grade_type, grade_date,
                  observations, created_by
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(grade.student_id)
    .bind(grade.subject_id)
    .bind(&grade.academic_period)
    .bind(grade.grade)
    .bind(grade.grade_type.as_str())
    .bind(grade.grade_date)
    .bind(&grade.observations)
    .bind(actor.profile_id)
    .fetch_one(pool)
    .await?;
    grade_from_row(&row)
}

pub async fn delete_grade(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_by_id(pool, "grades", id).await
}

pub async fn list_attendance(
    pool: &PgPool,
    subject_id: Option<Uuid>,
    attendance_date: Option<NaiveDate>,
) -> Result<Vec<Attendance>> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT id, student_id, subject_id, academic_period, attendance_date, is_present, \
         is_late, observations, created_by FROM dropout_watch.attendances WHERE TRUE",
    );
    if let Some(subject_id) = subject_id {
        query.push(" AND subject_id = ").push_bind(subject_id);
    }
    if let Some(date) = attendance_date {
        query.push(" AND attendance_date = ").push_bind(date);
    }
    query.push(" ORDER BY attendance_date DESC, student_id");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(attendance_from_row).collect()
}

/// Students holding an active enrollment in the subject for the period.
pub async fn roster_for_subject(
    pool: &PgPool,
    subject_id: Uuid,
    academic_period: &str,
) -> Result<Vec<Student>> {
    let columns = STUDENT_COLUMNS
        .split(", ")
        .map(|column| format!("s.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let rows = sqlx::query(&format!(
        "SELECT {columns} FROM dropout_watch.students s \
         JOIN dropout_watch.enrollments e ON e.student_id = s.id \
         WHERE e.subject_id = $1 AND e.academic_period = $2 AND e.status = 'activo' \
         ORDER BY s.last_name, s.first_name"
    ))
    .bind(subject_id)
    .bind(academic_period)
    .fetch_all(pool)
    .await?;
    rows.iter().map(student_from_row).collect()
}

/// Upserts one row per mark keyed on (student, subject, date), so a
/// resubmitted roster replaces the earlier marks instead of duplicating them.
pub async fn record_attendance(
    pool: &PgPool,
    actor: &Actor,
    roster: &AttendanceRoster,
) -> Result<usize> {
    roster.validate()?;
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for mark in &roster.marks {
        let result = sqlx::query(
            r#"
            INSERT INTO dropout_watch.attendances
            (id, student_id, subject_id, academic_period, attendance_date, is_present, is_late,
             observations, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (student_id, subject_id, attendance_date) DO UPDATE
            SET academic_period = EXCLUDED.academic_period,
                is_present = EXCLUDED.is_present,
                is_late = EXCLUDED.is_late,
                observations = EXCLUDED.observations,
                created_by = EXCLUDED.created_by
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(mark.student_id)
        .bind(roster.subject_id)
        .bind(&roster.academic_period)
        .bind(roster.attendance_date)
        .bind(mark.is_present)
        .bind(mark.is_late)
        .bind(&mark.observations)
        .bind(actor.profile_id)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected() as usize;
    }

    tx.commit().await?;
    info!(
        subject_id = %roster.subject_id,
        date = %roster.attendance_date,
        written,
        present = roster.present_count(),
        "attendance recorded"
    );
    Ok(written)
}

pub async fn create_prediction(pool: &PgPool, prediction: &NewPrediction) -> Result<Prediction> {
    prediction.validate()?;
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO dropout_watch.dropout_predictions
        (id, student_id, risk_level, probability, factors_analyzed, model_version)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {PREDICTION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(prediction.student_id)
    .bind(prediction.risk_level.as_str())
    .bind(prediction.probability)
    .bind(&prediction.factors_analyzed)
    .bind(&prediction.model_version)
    .fetch_one(pool)
    .await?;
    prediction_from_row(&row)
}

pub async fn list_predictions(pool: &PgPool, student_id: Uuid) -> Result<Vec<Prediction>> {
    let rows = sqlx::query(&format!(
        "SELECT {PREDICTION_COLUMNS} FROM dropout_watch.dropout_predictions \
         WHERE student_id = $1 ORDER BY prediction_date DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(prediction_from_row).collect()
}

/// Latest active prediction, the authoritative current risk for a student.
pub async fn current_prediction(pool: &PgPool, student_id: Uuid) -> Result<Option<Prediction>> {
    let row = sqlx::query(&format!(
        "SELECT {PREDICTION_COLUMNS} FROM dropout_watch.dropout_predictions \
         WHERE student_id = $1 AND is_active \
         ORDER BY prediction_date DESC LIMIT 1"
    ))
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(prediction_from_row).transpose()
}
