//! Layout of the coordination namespace.

pub const TABLES: &str = "/tables";
pub const TABLE_NAMES: &str = "/table_names";
pub const TABLE_ID_COUNTER: &str = "/table_id_counter";
pub const NEXT_FILE: &str = "/next_file";
pub const USERS: &str = "/users";
/// Liveness locks of tablet servers, one child per `host:port`.
pub const TSERVERS: &str = "/tservers";
pub const DEAD_TSERVERS: &str = "/dead/tservers";
pub const SUPPRESSED_TSERVERS: &str = "/suppressed/tservers";
/// Per-transaction scratch values.
pub const FATE: &str = "/fate";
