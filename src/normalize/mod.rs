//! Per-source transforms from raw rows to typed record sets.

pub mod filming;
pub mod literal;
pub mod movies;
pub mod restaurants;

pub use filming::{normalize_filming_locations, FilmingTables};
pub use movies::{normalize_movies, MovieTables};
pub use restaurants::{normalize_restaurants, RestaurantTables};
