mod delivery;
mod quantity;

pub use delivery::next_delivery_date;
pub use quantity::{eval_quantity, QuantityError};
