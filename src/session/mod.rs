//! 会话层：游戏服务与认证的抽象，以及内存模拟实现

pub mod mock;
pub mod traits;

pub use mock::{SessionOp, SimulatedAuthenticator, SimulatedSession, SimulatedWorld};
pub use traits::{Authenticator, GameSession, SessionError, SessionHandle};
