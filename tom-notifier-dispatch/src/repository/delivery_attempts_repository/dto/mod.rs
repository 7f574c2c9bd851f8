mod new_delivery_attempt;

pub use new_delivery_attempt::*;
