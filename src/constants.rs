/// Audit and routing constants shared across the pipeline and the adapters.

// Audit status values written to the summary table
pub const STATUS_VALID: &str = "Valid";
pub const STATUS_INVALID: &str = "Invalid";

// Error message recorded for records that passed validation
pub const NO_ERRORS: &str = "NA";

// Separator used when joining validator messages into one audit field
pub const ERROR_SEPARATOR: &str = ", ";

// Column names of the persisted audit row
pub const AUDIT_STATUS_FIELD: &str = "Validation_Status";
pub const AUDIT_ERROR_FIELD: &str = "Validation_Error_Message";

// Extension of routed output objects
pub const OUTPUT_EXTENSION: &str = "json";

// Defaults used when no configuration is supplied
pub const DEFAULT_CONFIG_PATH: &str = "validator.toml";
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_RAW_CONTAINER: &str = "raw";
pub const DEFAULT_VALID_CONTAINER: &str = "valid";
pub const DEFAULT_INVALID_CONTAINER: &str = "invalid";
pub const DEFAULT_AUDIT_DB: &str = "audit.db";
pub const DEFAULT_AUDIT_TABLE: &str = "validation_summary";
pub const DEFAULT_SCHEMA_PATH: &str = "schemas/customer_inbound.v1.json";
pub const DEFAULT_CORRELATION_POINTER: &str = "/customerTechnicalHeader/correlationId";
pub const DEFAULT_CONCURRENCY: usize = 16;
/// Finished runs kept for status queries; older ones are evicted.
pub const DEFAULT_RETAINED_RUNS: usize = 64;
pub const DEFAULT_LOG_DIR: &str = "logs";
