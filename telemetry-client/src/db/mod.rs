pub mod mapping_queries;
pub mod reading_queries;
pub mod schema;
