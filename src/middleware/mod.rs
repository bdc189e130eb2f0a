pub mod auth;
pub mod error_handler;
pub mod request_id;

pub use auth::{CurrentUser, UserIdentity, USER_ID_HEADER};
pub use error_handler::{json_error_handler, path_error_handler, query_error_handler};
pub use request_id::RequestId;
