use crate::validate::FieldErrors;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    #[error("username is already taken")]
    UsernameTaken,

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("not signed in")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("corrupt {what} in row: {value}")]
    Corrupt { what: &'static str, value: String },

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, message: &'static str) -> Self {
        let mut errors = FieldErrors::default();
        errors.insert(field, message);
        Error::Validation(errors)
    }

    pub(crate) fn corrupt(what: &'static str, value: impl ToString) -> Self {
        Error::Corrupt { what, value: value.to_string() }
    }

    /// Unique constraint violations reported by the database.
    pub(crate) fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}
