//! Client-side state machine for shared jigsaw sessions: a local replica of
//! the board kept in step with a realtime key/value store.

pub mod client;
pub mod error;
pub mod identity;
pub mod interaction;
pub mod memory_store;
pub mod piece_store;
pub mod runtime;
pub mod session;
pub mod store;
pub mod surface;

pub use client::{ClientBuilder, GameClient};
pub use error::{ClientError, HostAction, StoreError};
pub use identity::{random_client_id, random_session_id};
pub use interaction::{ActiveDrag, InteractionMachine, PieceInteraction, ReleaseOutcome};
pub use memory_store::{ConnectionId, MemoryHub, MemoryStore};
pub use piece_store::{BoardApply, PieceStore, RemoteApply, WriteReceipt};
pub use runtime::{ClientEvent, ClientHooks, ClientView, Clock, ManualClock, SystemClock};
pub use session::{Entitlements, Liveness, PlayerPresence, Reconfigure, SessionChange, SessionController};
pub use store::{DisconnectAction, RealtimeStore, StoreCallback, StoreChange, Subscription};
pub use surface::{CameraControl, NoCamera, PieceView, RenderSurface, ScreenPoint};
