//! Share-vault backend.

/// Reference share vault.
pub mod share_vault;

pub use share_vault::ShareVault;
