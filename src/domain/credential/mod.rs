pub mod error;
pub mod model;
pub mod pool;
pub mod service;

pub use error::{CredentialServiceError, PoolError};
pub use model::{
    mask_secret, CreateCredentialRequest, Credential, CredentialResponse, CredentialStatus,
    FatalReason, UpdateCredentialRequest,
};
pub use pool::{Acquisition, CredentialLease, CredentialPool, PoolWait, DEFAULT_COOLDOWN};
pub use service::{CredentialService, CredentialServiceApi};
