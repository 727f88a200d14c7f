pub mod bytes;
pub mod crypto;
