pub mod signing_package;
pub mod types;
