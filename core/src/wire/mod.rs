//! Length-prefixed JSON framing shared by every link kind (seed-to-seed,
//! peer-to-seed, peer-to-peer).

mod frame;
mod message;

pub use frame::{read_message, write_message, FrameError, ViolationTracker};
pub use message::{
    DeadConfirmed, DeadProposal, DeadReport, DeadVote, Gossip, Hello, Message, PlRequest,
    PlResponse, Ping, Pong, RegisterAck, RegisterCommit, RegisterNack, RegisterProposal,
    RegisterRequest, RegisterVote, SuspectRequest, SuspectResponse,
};
