// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod admin_handler {
    pub use crate::admin_handler::*;
}

pub mod routes {
    pub use crate::routes::*;
}
