mod bounding_box;
pub use self::bounding_box::*;

mod containment_type;
pub use self::containment_type::*;
