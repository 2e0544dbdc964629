/// Inbound chat webhook gate and event filtering
pub mod staleness;
pub mod verification;

pub use staleness::{is_stale, RecentMessages};
pub use verification::{authenticate_event, verify_challenge, SIGNATURE_HEADER};
