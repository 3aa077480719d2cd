pub mod chat;
pub mod erp;

pub use chat::ChatApi;
pub use erp::{ErpApi, ErpApiError};
