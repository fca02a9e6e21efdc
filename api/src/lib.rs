//! HTTP surface for switchwatch.
//!
//! Two endpoints over plain HTTP/1.1, one request per connection:
//!
//! - `GET /status` returns `{"state": <bool>}`
//! - `POST /optin` takes `user_id` and `token` form fields and records the
//!   subscriber when the token matches the configured verification token
//!
//! Every response carries `Content-Length` and `Connection: close`.

mod request;
mod response;
mod routes;
mod server;

pub use request::{MAX_BODY_BYTES, MAX_HEAD_BYTES, Request, RequestError, read_request};
pub use response::Response;
pub use routes::{ApiState, handle_request};
pub use server::{READ_TIMEOUT, handle_connection, serve};
