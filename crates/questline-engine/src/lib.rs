pub mod completion;
pub mod postback;

pub use completion::{CompletionEngine, CompletionOutcome, DEPOSIT_REFERRAL_BONUS};
pub use postback::PostbackAdapter;
