pub mod cache;
pub mod error;
pub mod quota;
pub mod reconcile;
pub mod reference;
pub mod resource;
pub mod upload;

pub use error::ResourceError;

#[cfg(test)]
pub(crate) mod testing;
