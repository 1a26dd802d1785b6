mod claims;
mod pkce;
mod validation;

pub use claims::{decode_access_claims, AccessTokenClaims};
pub use pkce::{challenge_s256, generate_state, generate_verifier, VERIFIER_BYTES};
pub use validation::ValidatedJson;
