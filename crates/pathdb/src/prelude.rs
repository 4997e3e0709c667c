pub use pathdb_types::error::{DbResult, Error};
pub use pathdb_types::types::Timestamp;

pub use tracing::{
	debug_span, info_span, warn_span, error_span,
	debug, info, warn, error,
};

// vim: ts=4
