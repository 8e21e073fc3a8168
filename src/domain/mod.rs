pub mod appointment;
pub mod booking_window;
pub mod calendar;
pub mod pricing;
pub mod purchase;
pub mod slot;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus, NewAppointment};
pub use booking_window::{BookingWindow, WindowDecision, WindowViolation};
pub use calendar::{classify, DayKind};
pub use pricing::{PriceBreakdown, PriceList, ServiceType};
pub use purchase::{IntentStatus, Pack, Purchase, PurchaseAward, PurchaseStatus};
pub use slot::{AllocatedSlot, Slot};
pub use user::{Role, User};
