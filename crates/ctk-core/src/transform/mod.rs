pub mod canonicalize;
pub mod name_normalizer;
pub mod normalize;
pub mod service;

pub use canonicalize::{Canonicalizer, canonicalize_schema};
pub use normalize::{NormalizeOptions, normalize, normalize_with_options};
pub use service::{ServiceFormat, normalize_service};
