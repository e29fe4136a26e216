//! Shared primitive types used across the portal core.

/// Stable identifier of a directory user.
pub type UserId = String;

/// Identifier of a site-visit or shop-drawing request.
pub type RequestId = String;

/// Full display name of an engineer, as stored in PIC fields.
pub type EngineerName = String;

/// Every timestamp in the core is UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
