pub const SUCCESS: i32 = 0;
/// The session reported at least one error.
pub const SESSION_FAILED: i32 = 1;
/// Arguments or the configuration file were rejected before connecting.
pub const INVALID_CONFIG: i32 = 2;
