pub mod auth;
pub mod connector;
pub mod error;
pub mod fetchers;
pub mod paginator;
pub mod retry;
pub mod session;

pub use auth::{AuthHeader, Credentials};
pub use connector::{Connector, SharedSession};
pub use error::{ClientError, Result};
pub use fetchers::{
    ConditionFetcher, FetchOptions, MedicationFetcher, MedicationJoin, ObservationFetcher,
    PatientFetcher, resolve_medication_code, search_all,
};
pub use paginator::drain;
pub use retry::{RetryPolicy, with_retry};
pub use session::FhirSession;
