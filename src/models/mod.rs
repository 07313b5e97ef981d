pub mod batch;
pub mod coupon;
pub mod event;
pub mod kit;
pub mod modality;
pub mod participant;
pub mod registration;
pub mod user;

pub use batch::Batch;
pub use coupon::{Coupon, DiscountKind};
pub use event::{Event, EventStatus};
pub use kit::{Kit, KitShirtSize, ShirtSize};
pub use modality::Modality;
pub use participant::Participant;
pub use registration::{PaymentStatus, Registration, RegistrationStatus};
pub use user::User;
