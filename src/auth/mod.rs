// Token codec: signs and parses access, refresh and admin JWTs
pub use token::TokenConfig;
pub use types::{Role, TokenClaims, TokenError, TokenKind, UserClaims};

mod token;
mod types;
