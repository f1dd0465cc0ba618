pub mod env;
pub mod error;
pub mod lock;
pub mod path;
pub mod uri;
