//! Draft composition and the three-phase signing flow

pub mod coordinator;
pub mod models;
pub mod pipeline;
pub mod prepare;
pub mod reservation;
pub mod signer;

pub use coordinator::{
    check_signature_completeness, SignatureCoordinator, SigningSession, SigningState,
};
pub use models::{
    signing_package::{SignedPackage, SigningPackage, SigningRequest},
    types::{get_supported_version, HasVersion, VersionedDocument},
};
pub use pipeline::{DraftPipeline, PipelineOutcome, PreparedDraft};
pub use prepare::{
    composer::{ComposeLimits, Composer, DraftComposer},
    input_selector::{
        FeeBasis, FeePolicy, FundingRequest, InputSelector, SelectionStrategy, UtxoSelection,
    },
};
pub use reservation::{PerAddressLock, ReservationGuard, UnreservedUtxos, UtxoReservation};
pub use signer::{verify_hash_signature, HashSigner, RistrettoHashSigner};
