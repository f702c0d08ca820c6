// collabspace-common: shared types and wire protocol for the CollabSpace hub

pub mod protocol;
pub mod types;
