//! Constants used throughout the planner

/// Default prefix for the relation produced by each step (`step_0`, `step_1`, ...)
pub const DEFAULT_RELATION_PREFIX: &str = "step";

/// Separator between source id and table name in a registry key
pub const SOURCE_SEPARATOR: char = '.';

/// Default output format of the CLI
pub const DEFAULT_OUTPUT_FORMAT: &str = "text";

/// History file kept by the interactive shell
pub const HISTORY_FILE_NAME: &str = ".prism_federation_history";
