//! Marketplace domain: aggregates, value objects, events and the partner price-list format.
pub mod aggregates;
pub mod catalog_file;
pub mod events;
pub mod value_objects;
