pub mod money;
pub mod payment;
pub mod transaction;

pub use money::Money;
pub use payment::{derive_status, Payer, PayerId, Payment, PaymentId, PaymentKind, PaymentStatus};
pub use transaction::{BankTransaction, TransactionId};
