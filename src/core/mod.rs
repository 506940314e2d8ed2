// Domain-layer modules and shared errors/models
pub mod normalization {
    pub use crate::normalization::*;
}

pub mod search {
    pub use crate::search::*;
}

pub mod profiles {
    pub use crate::profiles::*;
}

pub mod imports {
    pub use crate::imports::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
