//! Line diff engine
//!
//! - `myers`: shortest edit script over lines (Myers' O(ND) algorithm)
//! - `unified`: unified-format rendering with three lines of context

pub mod myers;
pub mod unified;
