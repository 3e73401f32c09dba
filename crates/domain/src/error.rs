//! Domain error types.
//!
//! Three layers of failure exist:
//! - [`ValidationError`]: an entity invariant was violated at construction.
//! - [`TransitionError`]: an invoice status change is not in the transition table.
//! - [`ServiceError`]: what a service call reports to its caller, classified
//!   by [`ErrorKind`] so that adapters can map it (HTTP 404/400/409/500).

use thiserror::Error;

use crate::invoice::InvoiceStatus;
use crate::money::Money;
use crate::ports::StorageError;

/// An entity invariant was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Kode customer tidak boleh kosong")]
    BlankCustomerCode,

    #[error("Nama customer tidak boleh kosong")]
    BlankCustomerName,

    #[error("Credit limit tidak boleh negatif")]
    NegativeCreditLimit,

    #[error("Nomor dokumen tidak boleh kosong")]
    BlankDocumentNumber,

    #[error("Due date tidak boleh sebelum tanggal invoice")]
    DueBeforeInvoiceDate,

    #[error("Tax rate tidak boleh negatif")]
    NegativeTaxRate,

    #[error("Tax rate tidak valid")]
    InvalidTaxRate,

    #[error("Paid amount tidak boleh negatif")]
    NegativePaidAmount,

    #[error("Paid amount tidak boleh melebihi total ({paid} > {total})")]
    PaidExceedsTotal { paid: Money, total: Money },

    #[error("Total invoice tidak konsisten dengan subtotal dan pajak")]
    InconsistentTotals,

    #[error("Deskripsi tidak boleh kosong")]
    BlankDescription,

    #[error("Quantity harus lebih dari 0")]
    InvalidQuantity,

    #[error("Harga tidak boleh negatif")]
    NegativeUnitPrice,

    #[error("Jumlah item tidak sesuai dengan quantity x harga")]
    InconsistentLineAmount,

    #[error("Jumlah pembayaran harus lebih dari 0")]
    NonPositivePayment,

    #[error("Jumlah alokasi harus lebih dari 0")]
    NonPositiveAllocation,

    #[error("Jumlah melebihi batas perhitungan")]
    AmountOverflow,
}

/// A requested invoice status change is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Transisi status tidak valid: {from} -> {to}")]
pub struct TransitionError {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

/// Classification of a service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced record does not exist.
    NotFound,
    /// The input violates a rule.
    Validation,
    /// The input is well-formed but the current state forbids the action.
    Conflict,
    /// Storage failed.
    Internal,
}

/// Error returned by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Kesalahan penyimpanan: {0}")]
    Internal(#[source] StorageError),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        ServiceError::Conflict(e.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => ServiceError::NotFound(e.to_string()),
            StorageError::Duplicate { .. }
            | StorageError::AllocationOverflow(_)
            | StorageError::StateConflict(_) => ServiceError::Conflict(e.to_string()),
            other => ServiceError::Internal(other),
        }
    }
}

/// A successful service result with a human-readable confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub data: T,
    pub message: String,
}

impl<T> Outcome<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }

    /// Transforms the payload, keeping the message.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            data: f(self.data),
            message: self.message,
        }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Result type for service operations that change state.
pub type ServiceResult<T> = Result<Outcome<T>, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_classify_as_validation() {
        let err: ServiceError = ValidationError::InvalidQuantity.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Quantity harus lebih dari 0");
    }

    #[test]
    fn transition_errors_classify_as_conflict() {
        let err: ServiceError = TransitionError {
            from: InvoiceStatus::Paid,
            to: InvoiceStatus::Cancelled,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("PAID -> CANCELLED"));
    }

    #[test]
    fn storage_errors_keep_their_meaning() {
        let missing: ServiceError = StorageError::NotFound {
            entity: "invoice",
            id: "x".into(),
        }
        .into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let overflow: ServiceError =
            StorageError::AllocationOverflow("payment exhausted".into()).into();
        assert_eq!(overflow.kind(), ErrorKind::Conflict);

        let moved: ServiceError = StorageError::StateConflict("invoice is CANCELLED".into()).into();
        assert_eq!(moved.kind(), ErrorKind::Conflict);

        let corrupt: ServiceError = StorageError::Corrupt("bad row".into()).into();
        assert_eq!(corrupt.kind(), ErrorKind::Internal);
    }

    #[test]
    fn outcome_map_keeps_message() {
        let outcome = Outcome::new(2, "ok").map(|n| n * 10);
        assert_eq!(outcome.data, 20);
        assert_eq!(outcome.message, "ok");
    }
}
