pub mod errors;
pub mod signature;
pub mod types;
