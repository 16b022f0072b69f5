//! Action surface exposed to presentation: every operation here coordinates
//! shared-record writes, local session history, and the attached engine.

/// Operator and test controls: forced phases, resets, simulated players.
pub mod control_service;
/// Boarding, leaving, removal, and host maintenance paths.
pub mod lobby_service;
/// The rejoin/recovery protocol.
pub mod rejoin_service;
/// Guarded phase transitions and acknowledgments.
pub mod round_service;
/// Attach/detach orchestration and entry-flow resume.
pub mod session_service;
