//! Native layouts and value types
//!
//! This module holds the bit-exact definitions of the platform structures the decoder reads and the
//! small value types (GUID, SID, time) built from them. Nothing here touches memory outside of a
//! bounds-checked slice.
pub mod etw_types;
pub mod guid;
pub mod sddl;
pub mod tdh_types;
pub mod time;
