//! Domain models for the clinic inventory system.

mod medication;
mod movement;
mod procurement;
mod quotation;
mod settings;
mod supplier;

pub use medication::*;
pub use movement::*;
pub use procurement::*;
pub use quotation::*;
pub use settings::*;
pub use supplier::*;

/// Current timestamp in the format used for all stored records.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fresh record identifier.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
