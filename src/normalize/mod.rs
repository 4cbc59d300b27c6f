// Pure conversions from heterogeneous page values to stored column values.

pub mod date;
pub mod location;

pub use date::parse_date;
pub use location::LocationRaw;
