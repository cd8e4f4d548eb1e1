//! Request middleware.

pub mod tower;
