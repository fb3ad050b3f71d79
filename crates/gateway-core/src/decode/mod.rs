mod family_b;
mod family_t;
mod registry;

pub use family_b::FamilyBDecoder;
pub use family_t::FamilyTDecoder;
pub use registry::DecoderRegistry;
