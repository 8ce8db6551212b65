pub mod extractor;
pub mod tokens;

pub use extractor::{bearer_token, AuthenticatedIdentity};
pub use tokens::{Claims, TokenPair, TokenService, TokenType};
