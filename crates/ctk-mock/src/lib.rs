pub mod generator;
pub mod model;

pub use generator::{MockConfigGenerator, protocol_kind};
pub use model::{MockDocument, MockMatcher, MockResponse, MockRoute, MockServer};
