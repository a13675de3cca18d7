use sea_orm::error::DbErr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    /// Requested more units than the product has on hand. Raised before
    /// any lot is mutated.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    /// A write that was expected to affect rows affected none.
    #[error("Inconsistent state: {0}")]
    Inconsistency(String),

    /// A conflicting concurrent mutation was detected during commit.
    /// The whole allocation run may be retried.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Whether retrying the whole operation can be expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_the_product_and_quantities() {
        let id = Uuid::nil();
        let err = ServiceError::InsufficientStock {
            product_id: id,
            requested: 10,
            available: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("requested 10"));
        assert!(msg.contains("available 8"));
    }

    #[test]
    fn db_error_constructor_accepts_strings() {
        let err = ServiceError::db_error("boom");
        assert!(matches!(err, ServiceError::DatabaseError(DbErr::Custom(_))));
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(ServiceError::Conflict("version mismatch".into()).is_retryable());
        assert!(!ServiceError::NotFound("lot".into()).is_retryable());
        assert!(!ServiceError::InsufficientStock {
            product_id: Uuid::nil(),
            requested: 1,
            available: 0,
        }
        .is_retryable());
    }
}
