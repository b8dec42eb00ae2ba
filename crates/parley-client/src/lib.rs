//! Client core for the parley real-time messaging pipeline.
//!
//! Four cooperating parts: the REST [`api`] layer fetches paginated
//! history and the conversation list, the [`reconcile`] module merges
//! the three message producers into one ordered view, the [`sidebar`]
//! module keeps conversation summaries in sync, and [`session`] ties
//! them to the shared channel owned by `parley-net`.

pub mod api;
pub mod error;
pub mod events;
pub mod history;
pub mod reconcile;
pub mod session;
pub mod sidebar;
pub mod viewport;

pub use api::ApiClient;
pub use error::{ApiError, SessionError};
pub use events::SessionEvent;
pub use history::{HistoryPager, PageRequest};
pub use reconcile::{Phase, PushOutcome, Reconciler};
pub use session::{ChatSession, HistoryFetch, SessionConfig};
pub use sidebar::{Sidebar, SidebarEntry};
pub use viewport::{ListChange, ScrollAction};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default tracing subscriber. Intended for binaries and
/// integration harnesses embedding the client.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_client=debug,parley_net=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
