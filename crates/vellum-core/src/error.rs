//! Crate-level error
//!
//! Every subsystem keeps its own closed `thiserror` enum; this is the
//! umbrella a caller who doesn't care which subsystem failed can match on
//! instead, the same role the teacher's top-level error plays over its
//! storage/consolidation/fsrs errors.

use crate::background::BackgroundError;
use crate::distill::DistillError;
use crate::id::IdError;
use crate::ltm::LtmError;
use crate::store::StoreError;
use crate::temporal::TemporalError;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Temporal(#[from] TemporalError),
    #[error(transparent)]
    Ltm(#[from] LtmError),
    #[error(transparent)]
    Distill(#[from] DistillError),
    #[error(transparent)]
    Background(#[from] BackgroundError),
}

pub type Result<T> = std::result::Result<T, Error>;
