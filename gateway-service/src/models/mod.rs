pub mod audit;
pub mod event;
pub mod policy;
pub mod risk;
pub mod session;

pub use audit::{AuditOutcome, AuditRecord};
pub use event::{DebugEvent, DebugEventType, EventDirection};
pub use policy::{
    PolicyContext, PolicyDecision, PolicyDecisionInput, PolicyResource, PolicyTenant, PolicyUser,
};
pub use risk::RiskAssessment;
pub use session::{BrowserSession, TenantContext, TokenSet};
