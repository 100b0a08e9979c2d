pub mod booking_cancel;
pub mod booking_inbound;
pub mod driver_presence;
pub mod driver_response;
pub mod offer_timeout;
pub mod queue_expiry;
pub mod try_match;
