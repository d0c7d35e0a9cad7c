// Entity Models
//
// Each entity has:
// - Stable identity that NEVER changes
// - Values adapted from whichever record source produced them

pub mod beneficiary;

pub use beneficiary::{AccountStatus, Beneficiary, IdentityStatus};
