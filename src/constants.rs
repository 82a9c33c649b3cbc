//! Hard-coded constants for STARTREE and its dependents.

/// Parent sentinel: the pixel has not been touched by the flooding yet.
pub const UNASSIGNED: i32 = -1;

/// Parent sentinel: the pixel is on the flooding frontier but not settled.
pub const IN_QUEUE: i32 = -2;

/// Parent sentinel: the pixel is the root of the tree.
pub const NO_PARENT: i32 = -3;

/// Label for pixels with no detected object on their parent chain.
pub const NO_OBJECT: i32 = -1;
