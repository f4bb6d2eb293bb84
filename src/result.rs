// 接口统一返回格式
// 页面脚本只看 code，非 0 时展示 error_message

use serde::{Deserialize, Serialize};

use crate::utils::error_codes;

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ApiResult<T> {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
}

impl<T> ApiResult<T> {
    pub fn success(content: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            error_message: None,
            content: Some(content),
        }
    }

    pub fn error(code: i32, message: &str) -> Self {
        Self {
            code,
            error_message: Some(message.to_owned()),
            content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == error_codes::SUCCESS
    }

    /// 拆出内容，失败时返回错误码和信息
    pub fn into_content(self) -> Result<T, (i32, String)> {
        match (self.is_success(), self.content) {
            (true, Some(content)) => Ok(content),
            (_, _) => Err((self.code, self.error_message.unwrap_or_default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_omits_content() {
        let body = serde_json::to_value(ApiResult::<()>::error(1002, "denied")).unwrap();
        assert_eq!(body, serde_json::json!({ "code": 1002, "error_message": "denied" }));
    }

    #[test]
    fn into_content_reports_failures() {
        assert_eq!(ApiResult::success(7).into_content(), Ok(7));
        assert_eq!(
            ApiResult::<i32>::error(1000, "bad").into_content(),
            Err((1000, "bad".to_string()))
        );
    }
}
