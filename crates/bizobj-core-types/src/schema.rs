//! Canonical schema constants for structured logging and events
//!
//! These constants keep log fields consistent between the data portal, the
//! transaction coordinator and the test capture layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Business object identifiers
pub const FIELD_MODEL: &str = "model";
pub const FIELD_ACTION: &str = "action";
pub const FIELD_PROPERTY: &str = "property";
pub const FIELD_DATA_SOURCE: &str = "data_source";
pub const FIELD_CONNECTION_ID: &str = "connection_id";

// Join barrier
pub const FIELD_BRANCHES: &str = "branches";
pub const FIELD_SUPPRESSED: &str = "suppressed";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
