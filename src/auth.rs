use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Shared service password. The login user names the caller; it is not
/// checked against the roster here.
#[derive(Debug)]
pub struct SquadtimeAuthSource {
    password: String,
}

impl SquadtimeAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for SquadtimeAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        tracing::debug!(user = login.user().unwrap_or_default(), "password requested");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
