mod phone;
mod secret;

pub mod helpers;

pub use phone::{PhoneNumber, PhoneNumberError};
pub use secret::Secret;
