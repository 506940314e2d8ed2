//! External service integrations.

pub mod geocoding {
    pub use crate::services::*;
}
