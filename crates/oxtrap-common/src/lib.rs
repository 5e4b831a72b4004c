pub mod oid;
pub mod types;

pub use oid::Oid;
