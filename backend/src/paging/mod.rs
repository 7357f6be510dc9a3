//! Cursor-based paging: tokens, bounded queries and row folding.

pub mod cursor;
pub mod fold;
pub mod query;

pub use cursor::{CursorError, PageKind, PageToken};
pub use fold::{fold, fold_stream, Folded, Folder, JoinedRow};
pub use query::{
    build_catalog, build_values, instant_key, next_token, row_limit, split_page, CatalogKey,
    CatalogQuery, PagePlan, Resume, ValuesQuery,
};
