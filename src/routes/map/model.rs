use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionAccepted {
    /// 当前是否有激活的会话在接收位置
    pub accepted: bool,
}
