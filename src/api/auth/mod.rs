mod auth;
mod credentials;
mod refresh;
mod secrets;

pub use auth::{authenticate_via_browser, AuthTokens};
pub use credentials::{CredentialSnapshot, CredentialStore, DRIVE_FILE_SCOPE};
pub use refresh::exchange_refresh_token;
pub use secrets::ClientSecrets;
