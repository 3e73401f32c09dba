//! Invoice status state machine.

use serde::{Deserialize, Serialize};

/// The status of an invoice in its lifecycle.
///
/// State transitions:
/// ```text
/// Draft ──► Sent ──┬──► PartialPaid ──┬──► Paid
///   │        │     │        ▲   │     │
///   │        │     └──► Overdue ◄┘ ───┘
///   │        ▼
///   └──► Cancelled
/// ```
///
/// Sent may also move straight to Paid. Paid and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Being prepared; line items can change.
    #[default]
    Draft,

    /// Issued to the customer, awaiting payment.
    Sent,

    /// Some but not all of the total has been paid.
    PartialPaid,

    /// Fully paid (terminal state).
    Paid,

    /// Past due, set explicitly by a scheduling step.
    Overdue,

    /// Withdrawn before any payment (terminal state).
    Cancelled,
}

impl InvoiceStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::PartialPaid,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    /// Statuses of invoices that still expect money.
    pub const ACTIVE: [InvoiceStatus; 3] = [
        InvoiceStatus::Sent,
        InvoiceStatus::PartialPaid,
        InvoiceStatus::Overdue,
    ];

    /// The statuses this status may move to on request.
    pub fn allowed_transitions(&self) -> &'static [InvoiceStatus] {
        match self {
            InvoiceStatus::Draft => &[InvoiceStatus::Sent, InvoiceStatus::Cancelled],
            InvoiceStatus::Sent => &[
                InvoiceStatus::PartialPaid,
                InvoiceStatus::Paid,
                InvoiceStatus::Overdue,
                InvoiceStatus::Cancelled,
            ],
            InvoiceStatus::PartialPaid => &[InvoiceStatus::Paid, InvoiceStatus::Overdue],
            InvoiceStatus::Overdue => &[InvoiceStatus::PartialPaid, InvoiceStatus::Paid],
            InvoiceStatus::Paid | InvoiceStatus::Cancelled => &[],
        }
    }

    /// Returns true if moving to `next` is in the transition table.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if line items can be modified in this status.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }

    /// Returns true if the invoice still expects payment.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Returns the stored/wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::PartialPaid => "PARTIAL_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    /// Returns the label shown to users.
    pub fn display_label(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Sent => "Terkirim",
            InvoiceStatus::PartialPaid => "Dibayar Sebagian",
            InvoiceStatus::Paid => "Lunas",
            InvoiceStatus::Overdue => "Jatuh Tempo",
            InvoiceStatus::Cancelled => "Dibatalkan",
        }
    }

    /// Parses a stored/wire name, ignoring case.
    pub fn parse(value: &str) -> Option<InvoiceStatus> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
