pub mod admin;
pub mod notifications;
pub mod payments;
pub mod submissions;
pub mod tasks;
pub mod uploads;
pub mod users;
pub mod withdrawals;
pub mod worker;
