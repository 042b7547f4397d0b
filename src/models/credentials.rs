use serde::Deserialize;

/// Provider account used to build the playlist URL
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// All three fields present (after trimming)
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.trim().is_empty()
    }
}

// Keep the password out of logs and panics
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
