//! Routing of notifications to rooms.

/// Where a notification goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Every connection in every room.
    AllRooms,
    /// Every connection in one room.
    Room(String),
    /// Nobody.
    Drop,
}

/// Decides which connections receive a notification payload.
pub trait FanoutPolicy: Send + Sync {
    /// Pick the route for one payload.
    fn route(&self, payload: &str) -> Route;
}

/// Relays every notification to every connected client.
///
/// Outcomes carry no room, so a client may see outcomes for jobs it never
/// submitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastAll;

impl FanoutPolicy for BroadcastAll {
    fn route(&self, _payload: &str) -> Route {
        Route::AllRooms
    }
}
