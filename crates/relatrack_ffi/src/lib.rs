//! Flutter-facing bridge for the relationship core.

pub mod api;
