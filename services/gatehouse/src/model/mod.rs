//! Gatehouse data model module.
//!
//! # Purpose
//! Re-exports the user and product records shared by the API and store layers.
mod product;
mod user;

pub use product::{NewProduct, Product, ProductUpdate};
pub use user::{NewUser, User, UserPatch};
