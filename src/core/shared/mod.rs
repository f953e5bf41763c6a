pub mod models;
#[cfg(feature = "postgres")]
pub mod schema;
pub mod state;
#[cfg(test)]
pub mod test_utils;
#[cfg(feature = "postgres")]
pub mod utils;
