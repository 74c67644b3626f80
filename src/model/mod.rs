//! # Property Graph Model
//!
//! Plain data types that cross every boundary: ingestion ↔ key package ↔
//! retriever ↔ caller.
//!
//! Design rule: no byte layouts and no store types here.
//! This module is pure data with no I/O and no state.

pub mod entity;
pub mod edge;
pub mod element;
pub mod value;
pub mod property_map;

pub use entity::Entity;
pub use edge::Edge;
pub use element::{Element, ElementSeed, SeedRange};
pub use value::Value;
pub use property_map::{properties, PropertyMap};
