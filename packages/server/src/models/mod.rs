pub mod resource;
pub mod shared;
