pub mod document;
pub mod operations;
pub mod schema;

pub use document::*;
pub use operations::*;
pub use schema::*;
