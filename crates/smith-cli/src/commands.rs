pub mod configure;
pub mod session;
