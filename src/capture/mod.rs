//! 捕捉层：装置选择与多轮捕捉谈判

pub mod negotiator;

pub use negotiator::{
    select_device, CaptureAttempt, CaptureConfig, CaptureNegotiator, CaptureOutcome, DeviceChoice,
    Negotiation,
};
