//! Transfer records and the submit/confirm path

pub mod dispatcher;
pub mod types;

pub use dispatcher::{ConfirmationPolicy, Quote, SendOutcome, TransferDispatcher, QUOTE_CURRENCY};
pub use types::{Transfer, TransferRequest, TransferStatus};
