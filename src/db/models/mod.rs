pub mod round;
pub mod session;

pub use round::{NewRound, Round};
pub use session::{
    generate_session_id, AggregateCounts, RoundsListing, Session, SessionStatus,
    SessionWithRounds, VideoSource,
};
