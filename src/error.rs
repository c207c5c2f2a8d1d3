use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The store could not be reached or rejected the query.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Upstream row carried a probability outside [0, 1].
    #[error("prediction {prediction_id} has probability {probability} outside [0, 1]")]
    InvalidProbability { prediction_id: Uuid, probability: f64 },

    /// Upstream row is missing a field the dashboard needs.
    #[error("prediction {prediction_id} is missing {field}")]
    MissingField {
        prediction_id: Uuid,
        field: &'static str,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),
}

impl Error {
    /// Data-integrity failures raised while aggregating, as opposed to fetch
    /// failures or bad user input.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidProbability { .. } | Error::MissingField { .. }
        )
    }

    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::Database(_))
    }

    /// Maps a unique-constraint violation onto `Duplicate`, leaving other
    /// database errors untouched.
    pub fn from_insert(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Duplicate(what.into())
            }
            _ => Error::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violations_are_distinct_from_fetch_failures() {
        let invalid = Error::InvalidProbability {
            prediction_id: Uuid::nil(),
            probability: 1.4,
        };
        assert!(invalid.is_contract_violation());
        assert!(!invalid.is_fetch_failure());

        let fetch = Error::Database(sqlx::Error::PoolTimedOut);
        assert!(fetch.is_fetch_failure());
        assert!(!fetch.is_contract_violation());

        assert!(!Error::InvalidInput("grade".to_string()).is_contract_violation());
    }

    #[test]
    fn non_unique_errors_pass_through_from_insert() {
        let err = Error::from_insert(sqlx::Error::RowNotFound, "student 2024001");
        assert!(matches!(err, Error::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn messages_name_the_offending_row() {
        let err = Error::MissingField {
            prediction_id: Uuid::nil(),
            field: "student_code",
        };
        assert_eq!(
            err.to_string(),
            "prediction 00000000-0000-0000-0000-000000000000 is missing student_code"
        );
    }
}
