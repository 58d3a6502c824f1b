// Error codes implementation
// Stable codes attached to collaborator errors so status strings can be matched
// without parsing human-readable messages.

pub mod transport {
    pub const CONNECTION_FAILED: &str = "NET_5001";
    pub const TIMEOUT: &str = "NET_5002";
    pub const BAD_STATUS: &str = "NET_5003";
    pub const UNAVAILABLE: &str = "NET_5004";
}

pub mod payload {
    pub const DECODE_FAILED: &str = "DATA_6001";
}

pub mod storage {
    pub const PERSISTENCE_FAILED: &str = "STORE_7001";
}

pub mod configuration {
    pub const INVALID_CONFIG: &str = "CFG_8001";
}

pub mod internal {
    pub const UNEXPECTED: &str = "SYS_9001";
}
