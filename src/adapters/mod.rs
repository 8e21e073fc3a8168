pub mod clock;
pub mod database;
pub mod notification;
pub mod payment;
