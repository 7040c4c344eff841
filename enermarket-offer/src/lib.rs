pub mod expiry;
pub mod lifecycle;
pub mod manager;
pub mod rules;

pub use expiry::ExpirySweeper;
pub use lifecycle::{apply_reservation, release_reservation};
pub use manager::{OfferDraft, OfferManager};
