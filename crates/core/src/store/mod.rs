pub mod error;
pub mod port;

pub use error::StoreError;
