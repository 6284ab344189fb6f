//! Readers for the three upstream datasets.

pub mod catalog;
pub mod open_data;
pub mod spreadsheet;

pub use catalog::CatalogClient;
pub use open_data::{OpenDataClient, OpenDataRecord};
pub use spreadsheet::read_filming_locations;
