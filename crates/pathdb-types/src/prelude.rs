pub use crate::error::{DbResult, Error};
pub use crate::types::Timestamp;

pub use tracing::{
	debug_span, info_span, warn_span, error_span,
	debug, info, warn, error,
};

// vim: ts=4
