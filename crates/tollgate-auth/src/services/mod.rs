//! Services composed from the storage traits.

pub mod authenticator;
pub mod bootstrap;
pub mod clients;
pub mod promotion;
pub mod registration;
pub mod replay;
pub mod verification;

pub use authenticator::UserAuthenticator;
pub use bootstrap::{BootstrapReport, Bootstrapper, INITIAL_KEY_ID};
pub use clients::{ClientRegistry, DEFAULT_ROTATED_SECRETS};
pub use promotion::{PromotionService, VerifiedAccount};
pub use registration::{Registration, RegistrationRequest, RegistrationService};
pub use replay::{PurgeReport, ReplayGuard};
pub use verification::{
    CODE_LENGTH, CodeDigester, CodeGenerator, FixedCodeGenerator, RandomCodeGenerator,
    VerificationService,
};
