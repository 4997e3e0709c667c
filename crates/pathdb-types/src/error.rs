use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::prelude::*;

pub type DbResult<T> = std::result::Result<T, Error>;

/// Error kinds surfaced across HTTP and internal APIs.
///
/// Backend-native errors are mapped to these kinds at the edge of the
/// store adapter; everything above passes them through unchanged.
#[derive(Debug)]
pub enum Error {
	/// No such document / path
	NotFound,
	/// Create collided with a live document
	Exists,
	/// CAS predicate unmet
	PreconditionFailed,
	/// Path/body validation failed
	InvalidArgument(String),
	/// Query or filter list failed to compile
	InvalidQuery(String),
	/// Missing or invalid token
	Unauthenticated,
	/// Role or rule check failed
	PermissionDenied,
	/// Session drop: a bounded outbound queue overflowed
	Backpressure,
	/// Subscribe would exceed the per-session subscription cap
	TooManySubscriptions,
	/// The request context was cancelled
	Canceled,
	Timeout,
	ConfigError(String),
	NetworkError(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Stable wire code for protocol error payloads.
	pub fn code(&self) -> &'static str {
		match self {
			Error::NotFound => "NOT_FOUND",
			Error::Exists => "EXISTS",
			Error::PreconditionFailed => "PRECONDITION_FAILED",
			Error::InvalidArgument(_) => "INVALID_ARGUMENT",
			Error::InvalidQuery(_) => "INVALID_QUERY",
			Error::Unauthenticated => "UNAUTHENTICATED",
			Error::PermissionDenied => "PERMISSION_DENIED",
			Error::Backpressure => "BACKPRESSURE",
			Error::TooManySubscriptions => "TOO_MANY_SUBSCRIPTIONS",
			Error::Canceled => "CANCELED",
			Error::Timeout => "TIMEOUT",
			Error::ConfigError(_) => "CONFIG",
			Error::NetworkError(_) => "NETWORK",
			Error::Internal(_) | Error::Io(_) => "INTERNAL",
		}
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "document not found"),
			Error::Exists => write!(f, "document already exists"),
			Error::PreconditionFailed => write!(f, "precondition failed"),
			Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
			Error::InvalidQuery(msg) => write!(f, "invalid query: {}", msg),
			Error::Unauthenticated => write!(f, "unauthenticated"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::Backpressure => write!(f, "backpressure"),
			Error::TooManySubscriptions => write!(f, "too many subscriptions"),
			Error::Canceled => write!(f, "canceled"),
			Error::Timeout => write!(f, "timeout"),
			Error::ConfigError(msg) => write!(f, "config error: {}", msg),
			Error::NetworkError(msg) => write!(f, "network error: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let status = match &self {
			Error::NotFound => StatusCode::NOT_FOUND,
			Error::Exists => StatusCode::CONFLICT,
			Error::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
			Error::InvalidArgument(_) | Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
			Error::Unauthenticated => StatusCode::UNAUTHORIZED,
			Error::PermissionDenied => StatusCode::FORBIDDEN,
			Error::TooManySubscriptions => StatusCode::TOO_MANY_REQUESTS,
			// Nginx convention: client closed the request
			Error::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let body = Json(json!({ "code": self.code(), "message": self.to_string() }));
		(status, body).into_response()
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		warn!("json error: {}", err);
		Error::InvalidArgument(err.to_string())
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(err: std::num::ParseIntError) -> Self {
		Error::InvalidArgument(err.to_string())
	}
}

impl From<std::time::SystemTimeError> for Error {
	fn from(err: std::time::SystemTimeError) -> Self {
		warn!("system time error: {}", err);
		Error::Internal(err.to_string())
	}
}

impl From<axum::Error> for Error {
	fn from(err: axum::Error) -> Self {
		warn!("axum error: {}", err);
		Error::NetworkError(err.to_string())
	}
}

impl From<axum::http::Error> for Error {
	fn from(err: axum::http::Error) -> Self {
		warn!("http error: {}", err);
		Error::NetworkError(err.to_string())
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", err);
		Error::Internal(err.to_string())
	}
}

impl From<tokio::time::error::Elapsed> for Error {
	fn from(_err: tokio::time::error::Elapsed) -> Self {
		Error::Timeout
	}
}

// vim: ts=4
