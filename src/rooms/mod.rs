pub mod buffer;
pub mod msg;
pub mod registry;
pub mod relay;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub use buffer::{ChatEntry, MessageBuffer};
pub use msg::{ClientEvent, JoinCall, ServerEvent};
pub use registry::{ConnectionId, Departure, RoomRegistry};
pub use relay::{MemberPresence, Presence, RelayConfig, SignalingRelay};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/socket", get(ws::room_ws))
}
