//! Field-level generators used by [`crate::RecordGenerator`].

pub mod author;
pub mod id;
