pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;

/// Length of a full object ID in hexadecimal characters
pub const OBJECT_ID_LENGTH: usize = 40;

/// Shortest hash prefix accepted for object lookup
pub const MIN_PREFIX_LENGTH: usize = 6;
