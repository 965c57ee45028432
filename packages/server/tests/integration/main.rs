mod common;
mod resource;
