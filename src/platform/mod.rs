//! 平台能力接口
//!
//! 引擎只依赖窄接口：权限解析器、动作执行器。内存平台用于测试和离线回放。
pub mod executor;
pub mod memory;
pub mod permission;

pub use executor::{ActionError, ActionExecutor, ActionResult};
pub use memory::{ExecutedAction, InMemoryPlatform, PlatformOp};
pub use permission::PermissionResolver;
