pub mod connection;
pub mod directory;
pub mod providers;
pub mod session;
pub mod token_cipher;

pub use connection::{CallbackFailure, CallbackOutcome, CallbackParams, ConnectionService};
pub use directory::{ConnectionDirectory, ConnectionSummary, DirectoryService};
pub use session::SessionService;
pub use token_cipher::TokenCipher;
