// Re-export all model types from submodules
mod notifications;
mod payments;
mod submissions;
mod tasks;
mod users;
mod withdrawals;

pub use notifications::*;
pub use payments::*;
pub use submissions::*;
pub use tasks::*;
pub use users::*;
pub use withdrawals::*;
