use crate::errors::Error;
use axum::extract::FromRequest;

/// `axum::Json` whose rejection renders as a crate validation error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);
