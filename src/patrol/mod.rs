//! 巡逻层：路点巡逻状态机、过程事件、背包整理与孵蛋

pub mod events;
pub mod housekeeping;
pub mod incubation;
pub mod orchestrator;

pub use events::{send_event, PatrolEvent};
pub use housekeeping::Housekeeper;
pub use incubation::Hatchery;
pub use orchestrator::{CycleReport, PatrolConfig, PatrolOrchestrator, PatrolPhase};
