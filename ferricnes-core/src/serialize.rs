use crate::nes::{self, Nes, StateError};

use serde_derive::{Deserialize, Serialize};

/// Save states are tagged with a version so old files are rejected (or
/// migrated) explicitly instead of being misread.
#[derive(Deserialize, Serialize)]
pub enum VersionedState {
    Version1(nes::State),
}

pub fn get_state(nes: &Nes) -> VersionedState {
    VersionedState::Version1(nes.get_state())
}

pub fn apply_state(nes: &mut Nes, state: &VersionedState) -> Result<(), StateError> {
    match state {
        VersionedState::Version1(state) => nes.apply_state(state),
    }
}
