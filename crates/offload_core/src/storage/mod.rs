//! Local file storage owned by the core.

pub mod attachment_store;
