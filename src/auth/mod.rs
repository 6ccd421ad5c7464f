//! Authentication and authorization module

pub mod jwt;
pub mod middleware;
pub mod revocation;

pub use jwt::{Claims, JwtService};
pub use middleware::{
    authenticate, extract_query_token, extract_token, jwt_auth_middleware,
    require_admin_middleware, stream_auth_middleware, AuthContext,
};
