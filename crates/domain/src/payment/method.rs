use serde::{Deserialize, Serialize};

/// How a customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    #[default]
    BankTransfer,
    CreditCard,
    Check,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::BankTransfer,
        PaymentMethod::CreditCard,
        PaymentMethod::Check,
        PaymentMethod::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::Check => "CHECK",
            PaymentMethod::Other => "OTHER",
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Tunai",
            PaymentMethod::BankTransfer => "Transfer Bank",
            PaymentMethod::CreditCard => "Kartu Kredit",
            PaymentMethod::Check => "Cek/Giro",
            PaymentMethod::Other => "Lainnya",
        }
    }

    /// Parses a method name, ignoring case. Unknown names become `Other`.
    pub fn parse(value: &str) -> PaymentMethod {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(value.trim()))
            .unwrap_or(PaymentMethod::Other)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
