//! Session id generation.

use uuid::Uuid;

/// Generate a new session id.
///
/// The format is `session_<epoch-ms>_<suffix>`, which keeps ids sortable by
/// creation time while remaining unique across concurrent sessions.
#[must_use]
pub fn generate_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{millis}_{}", &suffix[..7])
}
