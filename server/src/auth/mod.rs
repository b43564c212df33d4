pub mod jwt;
pub mod middleware;

pub use jwt::{AuthError, IdentityResolver, JwtIdentityResolver};
pub use middleware::AuthUser;
