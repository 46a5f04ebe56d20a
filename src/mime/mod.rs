//! MIME policy tables: file categories and banned types.

pub mod banned;
pub mod category;

pub use banned::{is_banned, is_inline_svg};
pub use category::FileCategory;
