pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use self::types as cfg;

pub(crate) fn default_algod_address() -> String {
    "http://localhost:4001".to_string()
}

pub(crate) fn default_algod_token() -> String {
    "a".repeat(64)
}

pub(crate) fn default_request_timeout_ms() -> u64 {
    10_000
}

pub(crate) fn default_retry_attempts() -> u32 {
    3
}

pub(crate) fn default_retry_initial_backoff_ms() -> u64 {
    500
}

pub(crate) fn default_retry_max_backoff_ms() -> u64 {
    30_000
}

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_logging_profile() -> cfg::LoggingProfile {
    cfg::LoggingProfile::Lean
}

pub(crate) fn default_timezone_offset_hours() -> i8 {
    0
}

pub(crate) fn default_max_wait_rounds() -> u64 {
    10
}

pub(crate) fn default_delegation_lifespan_rounds() -> u64 {
    172_800
}

pub(crate) fn default_lender_max_amount() -> u64 {
    2_000_000
}

pub(crate) fn default_network() -> String {
    "default".to_string()
}

pub(crate) fn default_one() -> u64 {
    1
}

pub(crate) fn default_manage_multiplier() -> u64 {
    5
}

pub(crate) fn default_configure_multiplier() -> u64 {
    10
}

pub(crate) fn default_two() -> u64 {
    2
}

pub(crate) fn default_borrow_multiplier() -> u64 {
    4
}

pub(crate) fn default_repay_multiplier() -> u64 {
    3
}
