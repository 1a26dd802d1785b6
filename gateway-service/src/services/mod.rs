//! Services layer for gateway-service.
//!
//! The authorization pipeline and its collaborators: session storage, the
//! identity-provider and policy-engine clients, risk scoring, audit
//! recording, overrides and the debug event bus.

pub mod audit;
pub mod bff;
pub mod error;
pub mod events;
pub mod gateway;
pub mod metrics;
pub mod oidc;
pub mod overrides;
pub mod policy;
pub mod risk;
pub mod session_store;

pub use audit::{AuditRecorder, AuditStore, MemoryAuditStore, PgAuditStore};
pub use bff::{BffService, LoginRedirect};
pub use error::GatewayError;
pub use events::{DebugEventBus, EventFilter};
pub use gateway::{ActionRequest, AuthorizationGateway, AuthorizedAction};
pub use oidc::OidcClient;
pub use overrides::OverrideControl;
pub use policy::PolicyClient;
pub use risk::RiskSignals;
pub use session_store::{InMemorySessionStore, SessionStore};
