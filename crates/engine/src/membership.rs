//! Hard compatibility rules for session membership.
//!
//! The model's membership verdict is advisory; type compatibility is not.
//! An item whose detected type is neither the candidate's type nor a
//! configured complementary pairing is rejected outright (confidence
//! forced to zero, the model never consulted).

use fc_domain::config::SessionConfig;
use fc_domain::session::SessionType;

/// True when an item of `detected` type may join a session of
/// `candidate` type.
pub fn compatible(config: &SessionConfig, detected: SessionType, candidate: SessionType) -> bool {
    detected == candidate || config.are_complementary(detected, candidate)
}
