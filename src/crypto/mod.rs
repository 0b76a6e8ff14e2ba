pub mod keys;
pub mod token;

pub use keys::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Malformed password hash")]
    MalformedHash,

    #[error("Malformed bearer token")]
    MalformedToken,

    #[error("Token secret too short: need at least {0} characters")]
    WeakSecret(usize),
}
