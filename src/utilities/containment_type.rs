/// Relationship between two bounding volumes, as reported by
/// [`BoundingBox::contains`](super::BoundingBox::contains).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainmentType {
    /// The boxes share no point.
    Disjoint,
    /// The first box fully contains the second.
    Contains,
    /// The boxes overlap, but the first does not contain the second.
    Intersects,
}
