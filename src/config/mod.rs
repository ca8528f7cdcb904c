mod locator;
mod login_credentials;

pub use locator::{Locator, RemoteLocator};
pub use login_credentials::{CredentialsError, LoginCredentials};
