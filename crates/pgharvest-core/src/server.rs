use serde::{Deserialize, Serialize};

/// `server_status` value marking a server as active in the directory.
pub const ACTIVE_STATUS: i32 = 1;

/// A row of the admin server directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub status: i32,
}

impl ServerEntry {
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}

/// Names of active servers, in directory order.
pub fn active_server_names(entries: Vec<ServerEntry>) -> Vec<String> {
    entries
        .into_iter()
        .filter(ServerEntry::is_active)
        .map(|entry| entry.name)
        .collect()
}
