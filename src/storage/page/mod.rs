pub mod hash_table_page;
pub mod page;
pub mod page_guard;
pub mod tmp_tuple_page;

pub use page::Page;
pub use page_guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
pub use tmp_tuple_page::{TmpTuple, TmpTuplePage};
